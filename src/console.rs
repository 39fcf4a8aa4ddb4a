//! Blocking interactive prompts used during first-run pairing.

use std::io::{self, BufRead, Write};

pub trait Console {
    /// Shows `message` and blocks until a line is entered. The line is returned without its newline.
    fn prompt(&mut self, message: &str) -> io::Result<String>;
}

/// Prompts on stdout and reads from stdin.
pub struct Terminal;

impl Console for Terminal {
    fn prompt(&mut self, message: &str) -> io::Result<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{}", message)?;
        stdout.flush()?;
        drop(stdout);

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed while waiting for input"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
