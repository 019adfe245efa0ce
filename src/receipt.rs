use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::BusinessInfo,
    models::{Client, ItemKind, OrderDetail, OrderStatus, PaymentMethod},
    sales::format_money,
};

/// Width of the plain-text rendering, in characters (80 mm thermal printers).
pub const RECEIPT_WIDTH: usize = 48;

/// Receipt
///
/// The printable document for one sale (GET /orders/{id}/receipt). Everything needed
/// to print is copied in, so the dashboard does not have to join anything.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Receipt {
    pub business_name: String,
    pub business_tax_id: String,
    pub business_address: String,
    pub business_phone: String,
    pub order_id: Uuid,
    pub receipt_number: i64,
    #[ts(type = "string")]
    pub issued_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub client_name: String,
    pub client_document: String,
    pub cashier: String,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReceiptLine {
    pub kind: ItemKind,
    pub description: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub line_total: i64,
}

impl Receipt {
    pub fn build(
        detail: &OrderDetail,
        client: &Client,
        cashier: &str,
        business: &BusinessInfo,
    ) -> Self {
        let order = &detail.order;
        Self {
            business_name: business.name.clone(),
            business_tax_id: business.tax_id.clone(),
            business_address: business.address.clone(),
            business_phone: business.phone.clone(),
            order_id: order.id,
            receipt_number: order.receipt_number,
            issued_at: order.created_at,
            status: order.status,
            payment_method: order.payment_method,
            client_name: client.full_name.clone(),
            client_document: client.document_number.clone(),
            cashier: cashier.to_string(),
            lines: detail
                .items
                .iter()
                .map(|item| ReceiptLine {
                    kind: item.kind,
                    description: item.description.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total,
                })
                .collect(),
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total,
            notes: order.notes.clone(),
        }
    }

    /// render_text
    ///
    /// Fixed-width rendering for thermal printers. No line exceeds `RECEIPT_WIDTH`;
    /// long descriptions are truncated.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(RECEIPT_WIDTH);
        let thin_rule = "-".repeat(RECEIPT_WIDTH);

        for line in [
            self.business_name.as_str(),
            self.business_tax_id.as_str(),
            self.business_address.as_str(),
            self.business_phone.as_str(),
        ] {
            push_line(&mut out, &center(line));
        }
        push_line(&mut out, &rule);

        push_line(&mut out, &columns("Recibo No.", &format!("{:06}", self.receipt_number)));
        push_line(
            &mut out,
            &columns("Fecha", &self.issued_at.format("%Y-%m-%d %H:%M UTC").to_string()),
        );
        push_line(&mut out, &columns("Cliente", &self.client_name));
        push_line(&mut out, &columns("Documento", &self.client_document));
        push_line(&mut out, &columns("Atendido por", &self.cashier));
        if self.status == OrderStatus::Cancelled {
            push_line(&mut out, &center("*** ANULADO ***"));
        }
        push_line(&mut out, &thin_rule);

        for line in &self.lines {
            push_line(&mut out, &truncate(&line.description, RECEIPT_WIDTH));
            push_line(
                &mut out,
                &columns(
                    &format!("  {} x {}", line.quantity, format_money(line.unit_price)),
                    &format_money(line.line_total),
                ),
            );
        }
        push_line(&mut out, &thin_rule);

        push_line(&mut out, &columns("Subtotal", &format_money(self.subtotal)));
        push_line(&mut out, &columns("IVA", &format_money(self.tax)));
        push_line(&mut out, &columns("TOTAL", &format_money(self.total)));
        push_line(&mut out, &columns("Forma de pago", payment_label(self.payment_method)));

        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            push_line(&mut out, &thin_rule);
            push_line(&mut out, &truncate(&format!("Notas: {notes}"), RECEIPT_WIDTH));
        }

        push_line(&mut out, &rule);
        push_line(&mut out, &center("Gracias por su compra"));
        out
    }
}

fn payment_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "Efectivo",
        PaymentMethod::Card => "Tarjeta",
        PaymentMethod::Transfer => "Transferencia",
    }
}

fn push_line(out: &mut String, line: &str) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{line}");
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn center(text: &str) -> String {
    let text = truncate(text, RECEIPT_WIDTH);
    let pad = (RECEIPT_WIDTH - text.chars().count()) / 2;
    format!("{}{text}", " ".repeat(pad))
}

/// Left label and right-aligned value on one line. The label is cut to make room.
fn columns(left: &str, right: &str) -> String {
    let right = truncate(right, RECEIPT_WIDTH);
    let right_len = right.chars().count();
    let room = RECEIPT_WIDTH.saturating_sub(right_len + 1);
    let left = truncate(left, room);
    let gap = RECEIPT_WIDTH - left.chars().count() - right_len;
    format!("{left}{}{right}", " ".repeat(gap))
}
