// Pricing helpers shared by cart, checkout and catalog
pub mod pricing;

// Catalog and shopping
pub mod cart;
pub mod catalog;
pub mod wishlist;

// Accounts
pub mod identity;
pub mod users;

// Money
pub mod coupons;
pub mod orders;
pub mod wallet;

// Reporting
pub mod reports;
