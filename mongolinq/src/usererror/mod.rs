pub trait UserError {
    fn code(&self) -> u32;
    fn user_message(&self) -> Option<String>;
    fn technical_message(&self) -> String;
}

/// Implements `Display` and `std::error::Error` for a `UserError` enum. The
/// rendered message leads with the error code and shows the user message,
/// when there is one, above the technical cause.
#[macro_export]
macro_rules! user_error_display {
    ($name:ty) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                use $crate::usererror::UserError;
                let message = match self.user_message() {
                    Some(user_message) => format!(
                        "{}\n\tCaused by:\n\t{}",
                        user_message,
                        self.technical_message()
                    ),
                    None => self.technical_message(),
                };
                write!(f, "Error {}: {}", self.code(), message)
            }
        }

        impl std::error::Error for $name {}
    };
}
