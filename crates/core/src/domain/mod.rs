pub mod conversation;
pub mod entity;
pub mod intent;
pub mod order;
pub mod product;
