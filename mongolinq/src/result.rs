use crate::{codegen, local_eval, translator, usererror::UserError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("translator error: {0}")]
    Translator(#[from] translator::Error),
    #[error("codegen error: {0}")]
    Codegen(#[from] codegen::Error),
    #[error("local evaluation error: {0}")]
    LocalEvaluation(#[from] local_eval::Error),
}

impl UserError for Error {
    fn code(&self) -> u32 {
        match self {
            Error::Translator(e) => e.code(),
            Error::Codegen(_) => 1003,
            Error::LocalEvaluation(_) => 1004,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            Error::Translator(e) => e.user_message(),
            Error::Codegen(_) => None,
            Error::LocalEvaluation(e) => Some(format!("the query failed while evaluated in process: {e}")),
        }
    }

    fn technical_message(&self) -> String {
        match self {
            Error::Translator(e) => e.technical_message(),
            Error::Codegen(e) => e.to_string(),
            Error::LocalEvaluation(e) => e.to_string(),
        }
    }
}
