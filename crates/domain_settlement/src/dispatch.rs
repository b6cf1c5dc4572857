//! Post-commit document and notification dispatch
//!
//! Dispatch runs only after the settlement transaction has committed. Every
//! step is bounded by a timeout and any failure is reported as a
//! [`DispatchWarning`]; nothing here can undo or fail a committed settlement.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use core_kernel::Currency;

use crate::error::DispatchError;
use crate::settlement::Settlement;

/// One line of a settlement statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub date: NaiveDate,
    pub qty: Decimal,
    pub rate: Decimal,
    pub line_total: Decimal,
}

/// Everything needed to render and announce a committed settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStatement {
    pub settlement: Settlement,
    pub farmer_name: String,
    pub farmer_phone: Option<String>,
    pub lines: Vec<StatementLine>,
    pub currency: Currency,
}

/// Reference to a rendered settlement document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub url: String,
}

/// An outbound message to a farmer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub phone: String,
    pub message: String,
    /// The rendered statement, when rendering succeeded
    pub document: Option<DocumentRef>,
}

/// Renders settlement documents
#[async_trait]
pub trait StatementRenderer: Send + Sync {
    async fn render(&self, statement: &SettlementStatement) -> Result<DocumentRef, DispatchError>;
}

/// Delivers messages to farmers
#[async_trait]
pub trait FarmerNotifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Dispatch step that produced a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStep {
    Render,
    RecordDocument,
    Notify,
}

/// A non-fatal failure of a post-commit step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchWarning {
    pub step: DispatchStep,
    pub message: String,
}

impl DispatchWarning {
    pub fn new(step: DispatchStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

/// Result of dispatching one statement
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub document: Option<DocumentRef>,
    pub warnings: Vec<DispatchWarning>,
}

/// SMS body announcing a settlement
pub fn settlement_message(
    farmer_name: &str,
    settlement: &Settlement,
    currency: Currency,
) -> String {
    format!(
        "Settlement Summary for {}\nPeriod: {} to {}\nAdvance Deducted: {}\nNet Payable: {}",
        farmer_name,
        settlement.period.date_from(),
        settlement.period.date_to(),
        currency.format(settlement.advance_deducted),
        currency.format(settlement.net_payable),
    )
}

/// Runs the renderer and notifier under a per-step timeout
#[derive(Clone)]
pub struct Dispatcher {
    renderer: Arc<dyn StatementRenderer>,
    notifier: Arc<dyn FarmerNotifier>,
    timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        renderer: Arc<dyn StatementRenderer>,
        notifier: Arc<dyn FarmerNotifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            notifier,
            timeout,
        }
    }

    /// Renders the statement and notifies the farmer
    ///
    /// The notification is attempted even if rendering failed.
    #[instrument(skip(self, statement), fields(settlement_id = %statement.settlement.id))]
    pub async fn dispatch(&self, statement: &SettlementStatement) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        match self.bounded("render", self.renderer.render(statement)).await {
            Ok(document) => {
                info!(url = %document.url, "Settlement statement rendered");
                outcome.document = Some(document);
            }
            Err(e) => {
                warn!(error = %e, "Settlement statement rendering failed");
                outcome.warnings.push(DispatchWarning::new(DispatchStep::Render, e.to_string()));
            }
        }

        let notified = match &statement.farmer_phone {
            Some(phone) if !phone.trim().is_empty() => {
                let notification = Notification {
                    phone: phone.clone(),
                    message: settlement_message(
                        &statement.farmer_name,
                        &statement.settlement,
                        statement.currency,
                    ),
                    document: outcome.document.clone(),
                };
                self.bounded("notify", self.notifier.notify(&notification)).await
            }
            _ => Err(DispatchError::MissingContact),
        };
        if let Err(e) = notified {
            warn!(error = %e, "Settlement notification failed");
            outcome.warnings.push(DispatchWarning::new(DispatchStep::Notify, e.to_string()));
        }

        outcome
    }

    async fn bounded<T>(
        &self,
        step: &'static str,
        future: impl std::future::Future<Output = Result<T, DispatchError>>,
    ) -> Result<T, DispatchError> {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                step,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// Writes plain-text statements to a directory
#[derive(Debug, Clone)]
pub struct FileStatementRenderer {
    dir: PathBuf,
    url_prefix: String,
}

impl FileStatementRenderer {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
        }
    }

    fn file_name(statement: &SettlementStatement) -> String {
        format!("settlement_{}.txt", statement.settlement.id.as_uuid())
    }
}

/// Plain-text body of a settlement statement
pub fn render_statement_text(statement: &SettlementStatement) -> String {
    let s = &statement.settlement;
    let money = |amount| statement.currency.format(amount);
    let mut out = String::new();

    out.push_str("Settlement Report\n");
    out.push_str(&format!("Farmer: {}\n", statement.farmer_name));
    out.push_str(&format!("Period: {}\n\n", s.period));
    out.push_str(&format!("{:<12}{:>12}{:>12}{:>14}\n", "Date", "Qty (kg)", "Rate", "Amount"));
    for line in &statement.lines {
        out.push_str(&format!(
            "{:<12}{:>12}{:>12}{:>14}\n",
            line.date.to_string(),
            line.qty.to_string(),
            money(line.rate),
            money(line.line_total),
        ));
    }
    out.push('\n');
    out.push_str(&format!("Total Quantity: {} kg\n", s.total_qty));
    out.push_str(&format!("Gross Amount: {}\n", money(s.gross_amount)));
    out.push_str(&format!("Labour: {}\n", money(s.total_labour)));
    out.push_str(&format!("Coolie: {}\n", money(s.total_coolie)));
    out.push_str(&format!("Transport: {}\n", money(s.total_transport)));
    out.push_str(&format!(
        "Commission ({}%): {}\n",
        s.commission_percent.value(),
        money(s.total_commission)
    ));
    out.push_str(&format!("Advance Deducted: {}\n", money(s.advance_deducted)));
    out.push_str(&format!("Net Payable: {}\n", money(s.net_payable)));
    out
}

#[async_trait]
impl StatementRenderer for FileStatementRenderer {
    async fn render(&self, statement: &SettlementStatement) -> Result<DocumentRef, DispatchError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DispatchError::Render(e.to_string()))?;

        let file_name = Self::file_name(statement);
        tokio::fs::write(self.dir.join(&file_name), render_statement_text(statement))
            .await
            .map_err(|e| DispatchError::Render(e.to_string()))?;

        Ok(DocumentRef {
            url: format!("{}/{}", self.url_prefix.trim_end_matches('/'), file_name),
        })
    }
}

/// Notifier that only logs the outgoing message
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl FarmerNotifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), DispatchError> {
        info!(
            phone = %notification.phone,
            message = %notification.message,
            document = notification.document.as_ref().map(|d| d.url.as_str()).unwrap_or("-"),
            "SMS queued"
        );
        Ok(())
    }
}
