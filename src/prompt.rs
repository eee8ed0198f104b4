//! Interactive prompts for per-session inputs.

use crate::error::TransferError;
use crate::types::Credentials;
use console::Term;
use std::io::BufRead;

fn read_answer(term: &Term, secret: bool) -> Result<String, TransferError> {
    // console only reads from a terminal; piped answers come from plain stdin.
    if !atty::is(atty::Stream::Stdin) {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        return Ok(line.trim().to_string());
    }
    let line = if secret {
        term.read_secure_line()?
    } else {
        term.read_line()?
    };
    Ok(line.trim().to_string())
}

/// Asks for a line of input.
pub fn ask(term: &Term, label: &str) -> Result<String, TransferError> {
    term.write_str(label)?;
    read_answer(term, false)
}

/// Same as [`ask`] but fails when the answer is empty.
pub fn ask_required(term: &Term, label: &str, what: &str) -> Result<String, TransferError> {
    let answer = ask(term, label)?;
    if answer.is_empty() {
        return Err(TransferError::MissingInput(what.to_string()));
    }
    Ok(answer)
}

/// Prompts for the relay login; the password is not echoed.
pub fn ask_credentials(term: &Term) -> Result<Credentials, TransferError> {
    let username = ask_required(term, "Relay username: ", "relay username")?;
    term.write_str("Relay password: ")?;
    let password = read_answer(term, true)?;
    Ok(Credentials::new(username, password))
}
