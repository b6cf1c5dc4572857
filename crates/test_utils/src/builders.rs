//! Test Data Builders
//!
//! Builders for farmers, groups and collection items with sensible defaults,
//! so tests spell out only the fields they assert on. Names and phone numbers
//! are generated with `fake`.

use chrono::NaiveDate;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{Percentage, VendorId};
use domain_settlement::{CollectionItem, Farmer, FarmerGroup, NewCollectionItem};

use crate::fixtures::{DateFixtures, RateFixtures};

/// Builder for farmers
pub struct FarmerBuilder {
    farmer: Farmer,
}

impl FarmerBuilder {
    pub fn new(vendor_id: VendorId) -> Self {
        let mut farmer = Farmer::new(vendor_id, Name().fake::<String>());
        farmer.phone = Some(PhoneNumber().fake());
        Self { farmer }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.farmer.name = name.into();
        self
    }

    pub fn without_phone(mut self) -> Self {
        self.farmer.phone = None;
        self
    }

    /// Joins `group`; its commission applies unless overridden
    pub fn in_group(mut self, group: &FarmerGroup) -> Self {
        self.farmer.group_id = Some(group.id);
        self
    }

    pub fn with_commission(mut self, percent: Decimal) -> Self {
        self.farmer.commission_percent = Some(RateFixtures::percent(percent));
        self
    }

    /// Opening advance balance; tests seeding a ledger must post a matching entry
    pub fn with_advance(mut self, balance: Decimal) -> Self {
        self.farmer.advance_total = balance;
        self
    }

    pub fn build(self) -> Farmer {
        self.farmer
    }
}

/// Builder for farmer groups
pub struct FarmerGroupBuilder {
    vendor_id: VendorId,
    name: String,
    commission_percent: Option<Percentage>,
}

impl FarmerGroupBuilder {
    pub fn new(vendor_id: VendorId) -> Self {
        Self {
            vendor_id,
            name: format!("{} group", Name().fake::<String>()),
            commission_percent: None,
        }
    }

    pub fn with_commission(mut self, percent: Decimal) -> Self {
        self.commission_percent = Some(RateFixtures::percent(percent));
        self
    }

    pub fn build(self) -> FarmerGroup {
        FarmerGroup::new(self.vendor_id, self.name, self.commission_percent)
    }
}

/// Builder for collection items
///
/// Defaults to 10 kg at 50 per kg on day 1 with no handling costs.
pub struct CollectionItemBuilder {
    new: NewCollectionItem,
    locked: bool,
}

impl CollectionItemBuilder {
    pub fn for_farmer(farmer: &Farmer) -> Self {
        Self {
            new: NewCollectionItem {
                vendor_id: farmer.vendor_id,
                farmer_id: farmer.id,
                group_id: farmer.group_id,
                date: DateFixtures::day(1),
                qty: dec!(10),
                rate: dec!(50),
                labour_per_unit: Decimal::ZERO,
                coolie_cost: Decimal::ZERO,
                transport_cost: Decimal::ZERO,
            },
            locked: false,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.new.date = date;
        self
    }

    pub fn on_day(self, day: u32) -> Self {
        self.on(DateFixtures::day(day))
    }

    pub fn qty_rate(mut self, qty: Decimal, rate: Decimal) -> Self {
        self.new.qty = qty;
        self.new.rate = rate;
        self
    }

    pub fn labour_per_unit(mut self, amount: Decimal) -> Self {
        self.new.labour_per_unit = amount;
        self
    }

    pub fn coolie(mut self, amount: Decimal) -> Self {
        self.new.coolie_cost = amount;
        self
    }

    pub fn transport(mut self, amount: Decimal) -> Self {
        self.new.transport_cost = amount;
        self
    }

    /// Marks the item as already consumed by a settlement
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn build(self) -> CollectionItem {
        CollectionItem::record(self.new)
            .expect("builder values are non-negative")
            .with_lock(self.locked)
    }
}
