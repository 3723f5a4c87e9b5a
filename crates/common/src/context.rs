/// Implemented by each crate's `Error` so [`impl_context!`] can wrap foreign
/// failures and missing values into it.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Define `Context` for `Result` and `Option` in the calling module, which
/// must have `Error: FromMessage` and a `Result<T>` alias in scope.
///
/// ```ignore
/// // crates/extensions/src/error.rs
/// browseros_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        /// Attach a message to a failure, producing this crate's `Error`.
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;
            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let context = context.into();
                self.with_context(|| context)
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.map_err(|e| {
                    let context: String = f().into();
                    $crate::FromMessage::from_message(format!("{context}: {e}"))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let context = context.into();
                self.with_context(|| context)
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.ok_or_else(|| $crate::FromMessage::from_message(f().into()))
            }
        }
    };
}
