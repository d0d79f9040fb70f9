//! Terminal side of the OAuth flows: ring, open a browser, read a code.

use std::io::Write;
use std::process::{Command, Stdio};

use divtrack_broker::Authorizer;
use log::{debug, warn};

use crate::config::AuthConfig;

/// Prompts on the controlling terminal for the verifier (E*TRADE) or the
/// redirected URL (Schwab).
pub struct TerminalAuthorizer {
    open_browser: bool,
    bell: bool,
}

impl TerminalAuthorizer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            open_browser: config.open_browser,
            bell: config.bell,
        }
    }
}

impl Authorizer for TerminalAuthorizer {
    fn authorize(&self, broker: &str, url: &str) -> Option<String> {
        if self.bell {
            print!("\x07");
            let _ = std::io::stdout().flush();
        }

        println!("\n{broker}: authorization required. Open this URL and approve access:\n\n  {url}\n");
        if self.open_browser {
            open_in_browser(url);
        }

        let prompt = match broker {
            "schwab" => "Paste the URL you were redirected to (empty to cancel)",
            _ => "Enter the verification code (empty to cancel)",
        };
        let input = dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text();

        match input {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!("{broker}: could not read authorization input: {e}");
                None
            }
        }
    }
}

/// Best effort. The URL is also printed so a failure here is only logged.
fn open_in_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(url);
        c
    } else if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    match command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(_) => debug!("launched browser for authorization"),
        Err(e) => warn!("could not open a browser: {e}"),
    }
}
