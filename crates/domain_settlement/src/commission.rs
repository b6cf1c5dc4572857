//! Commission resolution
//!
//! The effective commission is the farmer-level override if set, else the
//! farmer group's default, else zero. A missing group, or a group that does not
//! belong to the farmer, is treated as "no group default" rather than an error.

use core_kernel::Percentage;

use crate::farmer::{Farmer, FarmerGroup};

/// Resolves the commission percentage for `farmer`
pub fn resolve_commission(farmer: &Farmer, group: Option<&FarmerGroup>) -> Percentage {
    if let Some(percent) = farmer.commission_percent {
        return percent;
    }

    group
        .filter(|g| Some(g.id) == farmer.group_id && g.vendor_id == farmer.vendor_id)
        .and_then(|g| g.commission_percent)
        .unwrap_or(Percentage::ZERO)
}
