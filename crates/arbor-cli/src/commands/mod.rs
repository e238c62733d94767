pub mod ls;
pub mod prune;
pub mod version;

use miette::{IntoDiagnostic, Result};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    ok: bool,
    error: ErrorBody<'a>,
}

/// Report a failed command. With `json`, prints the error object to stdout
/// and exits 1; otherwise returns it as a diagnostic.
pub fn fail(json: bool, err: arbor_core::Error) -> Result<()> {
    if json {
        let output = ErrorOutput {
            ok: false,
            error: ErrorBody {
                code: err.code(),
                message: err.to_string(),
            },
        };
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        std::process::exit(1);
    }
    Err(err).into_diagnostic()
}
