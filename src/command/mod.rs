mod apply;
mod login;
mod logout;
mod push;
mod status;
mod validate;

pub use apply::run_apply;
pub use login::run_login;
pub use logout::run_logout;
pub use push::run_push;
pub use status::run_status;
pub use validate::run_validate;
