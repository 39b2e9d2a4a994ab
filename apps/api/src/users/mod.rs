// Account creation and the account summary (subscription + usage ledger).

pub mod handlers;
