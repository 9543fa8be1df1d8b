//! Authentication service models

pub mod session;
pub mod user;

pub use session::{LoginSession, NewLoginSession, SessionStatus, SessionToken};
pub use user::{NewUser, PasswordResetToken, ResetPurpose, UpdateUser, User};
