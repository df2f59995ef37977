pub mod query;
pub mod reaction;
pub mod todo;
pub mod user;

pub use query::TodoQuery;
pub use reaction::{Reaction, ReactionState, Transition};
pub use todo::{ChecklistEntry, Comment, NewTodo, Todo, TodoEdit};
pub use user::{NewUser, PasswordHash, User, UserPublicView, UserSelfView};
