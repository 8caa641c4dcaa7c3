//! Invoice data and a dependency-free single-page PDF renderer.

use super::{DocumentRenderer, RenderError};
use crate::domain::{Currency, Money, Transaction, User};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceLine {
    pub description: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceData {
    pub invoice_number: String,
    pub issued_at: String,
    pub customer_name: String,
    pub customer_email: String,
    pub currency: Currency,
    pub status: String,
    pub lines: Vec<InvoiceLine>,
    pub total: Money,
}

impl InvoiceData {
    pub fn from_transaction(tx: &Transaction, customer: &User) -> Self {
        let short_id: String = tx.id.simple().to_string().chars().take(8).collect();
        Self {
            invoice_number: format!("INV-{}-{}", tx.tx_type.as_str().to_uppercase(), short_id),
            issued_at: tx.created_at.to_rfc3339(),
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            currency: tx.currency,
            status: tx.status.to_string(),
            lines: vec![InvoiceLine {
                description: tx.description.clone(),
                amount: tx.amount,
            }],
            total: tx.amount,
        }
    }

    fn text_lines(&self) -> Vec<String> {
        let mut out = vec![
            format!("Invoice {}", self.invoice_number),
            format!("Issued: {}", self.issued_at),
            format!("Customer: {} <{}>", self.customer_name, self.customer_email),
            format!("Status: {}", self.status),
            String::new(),
        ];
        for line in &self.lines {
            out.push(format!("{}  {} {}", line.description, self.currency, line.amount));
        }
        out.push(String::new());
        out.push(format!("Total: {} {}", self.currency, self.total));
        out
    }
}

/// Renders invoices as a minimal PDF 1.4 document using the built-in Helvetica font.
///
/// A stand-in for a real document service: one text page, no layout. Swap it via
/// [`DocumentRenderer`] when invoices need branding.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfInvoiceRenderer;

fn escape_pdf_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

impl DocumentRenderer for PdfInvoiceRenderer {
    fn render_invoice(&self, invoice: &InvoiceData) -> Result<Vec<u8>, RenderError> {
        if invoice.lines.is_empty() {
            return Err(RenderError::Failed("invoice has no lines".to_string()));
        }

        let mut content = String::from("BT\n/F1 12 Tf\n16 TL\n50 790 Td\n");
        for line in invoice.text_lines() {
            content.push_str(&format!("({}) Tj T*\n", escape_pdf_text(&line)));
        }
        content.push_str("ET\n");

        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{}endstream",
                content.len(),
                content
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut pdf = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
        }

        let xref_offset = pdf.len();
        pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            pdf.push_str(&format!("{:010} 00000 n \n", offset));
        }
        pdf.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        ));

        Ok(pdf.into_bytes())
    }
}
