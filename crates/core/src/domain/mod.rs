pub mod action;
pub mod customer;
pub mod outcome;
pub mod request;
