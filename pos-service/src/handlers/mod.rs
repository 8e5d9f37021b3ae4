pub mod customers;
pub mod health;
pub mod payments;
pub mod products;
pub mod receipts;
pub mod sales;
