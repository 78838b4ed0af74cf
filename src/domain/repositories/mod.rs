pub mod invoices;
pub mod retry_ledger;
