pub mod favorites;
pub mod follows;
pub mod ingredients;
pub mod recipes;
pub mod shopping_list;
pub mod tags;
pub mod users;

pub use favorites::*;
pub use follows::*;
pub use ingredients::*;
pub use recipes::*;
pub use shopping_list::*;
pub use tags::*;
pub use users::*;
