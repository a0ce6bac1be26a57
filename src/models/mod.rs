pub mod document;
pub mod todo;
pub mod user;

pub use document::{FieldUpdate, StoreTimestamp, StoredTodo, TodoListField, UserDocument};
pub use todo::{NewTodoRequest, Todo, UpdateTodoRequest};
pub use user::UserId;
