pub mod aggregate;
pub mod inspect;
