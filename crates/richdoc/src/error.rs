use core::fmt;
use std::{borrow::Cow, ops::Deref};

/// An error that can occur during the export process.
///
/// Recoverable conditions (missing images, malformed attributes, unknown
/// node kinds) never reach this type; they are logged and skipped. What is
/// left are failures of the final packaging stage and of the surrounding IO.
#[derive(Clone)]
pub struct Error(Box<Repr>);

#[derive(Clone)]
enum Repr {
    /// Just a message.
    Msg(Cow<'static, str>),
    /// A message with the stage it happened in.
    WithContext(Cow<'static, str>, Cow<'static, str>),
}

impl Error {
    /// Attaches the stage in which the error happened.
    pub fn context(self, ctx: impl Into<Cow<'static, str>>) -> Self {
        let msg = match *self.0 {
            Repr::Msg(msg) => msg,
            Repr::WithContext(inner, msg) => format!("{inner}: {msg}").into(),
        };
        Error(Box::new(Repr::WithContext(ctx.into(), msg)))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.deref() {
            Repr::Msg(s) => write!(f, "{s}"),
            Repr::WithContext(ctx, s) => write!(f, "{ctx}: {s}"),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for Error {}

macro_rules! impl_from_display {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Error {
            fn from(e: $ty) -> Self {
                Error(Box::new(Repr::Msg(e.to_string().into())))
            }
        })*
    };
}

impl_from_display! {
    std::io::Error,
    fmt::Error,
    quick_xml::Error,
    zip::result::ZipError,
    image::ImageError,
    reqwest::Error,
    serde_json::Error,
    toml::de::Error,
    base64::DecodeError,
}

impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Error(Box::new(Repr::Msg(s.into())))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error(Box::new(Repr::Msg(s.into())))
    }
}

impl From<Cow<'static, str>> for Error {
    fn from(s: Cow<'static, str>) -> Self {
        Error(Box::new(Repr::Msg(s)))
    }
}

/// Adds [`Error::context`] to results.
pub trait ResultExt<T> {
    /// Wraps the error with the stage in which it happened.
    fn context(self, ctx: &'static str) -> crate::Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for Result<T, E> {
    fn context(self, ctx: &'static str) -> crate::Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}
