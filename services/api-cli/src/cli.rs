//! Command-line parsing
//!
//! Flags may appear anywhere; the remaining words form the command.

use credentials::Secret;

use crate::error::{Error, Result};

pub const USAGE: &str = "usage: authclient [--config PATH] [--metrics] <command>

commands:
  login EMAIL PASSWORD   sign in and store the credential pair
  logout                 forget stored credentials
  get PATH               GET <base_url>/PATH
  post PATH [JSON]       POST a JSON body (default {}) to <base_url>/PATH";

#[derive(Debug, PartialEq)]
pub enum Command {
    Login {
        email: String,
        password: Secret<String>,
    },
    Logout,
    Get {
        path: String,
    },
    Post {
        path: String,
        body: serde_json::Value,
    },
}

#[derive(Debug, PartialEq)]
pub struct Cli {
    pub config_path: Option<String>,
    /// Print the Prometheus exposition to stderr before exiting
    pub metrics: bool,
    pub command: Command,
}

impl Cli {
    /// Parse arguments, excluding the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut config_path = None;
        let mut metrics = false;
        let mut words = Vec::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    let path = iter
                        .next()
                        .ok_or_else(|| Error::Usage("--config requires a path".into()))?;
                    config_path = Some(path.clone());
                }
                "--metrics" => metrics = true,
                flag if flag.starts_with("--") => {
                    return Err(Error::Usage(format!("unknown flag: {flag}")));
                }
                word => words.push(word),
            }
        }

        let command = match words.as_slice() {
            ["login", email, password] => Command::Login {
                email: email.to_string(),
                password: Secret::new(password.to_string()),
            },
            ["logout"] => Command::Logout,
            ["get", path] => Command::Get {
                path: path.to_string(),
            },
            ["post", path] => Command::Post {
                path: path.to_string(),
                body: serde_json::json!({}),
            },
            ["post", path, body] => Command::Post {
                path: path.to_string(),
                body: serde_json::from_str(body).map_err(|e| {
                    Error::Usage(format!("request body is not valid JSON: {e}"))
                })?,
            },
            [] => return Err(Error::Usage("missing command".into())),
            [name, ..] => {
                return Err(Error::Usage(format!(
                    "unknown command or wrong number of arguments: {name}"
                )));
            }
        };

        Ok(Self {
            config_path,
            metrics,
            command,
        })
    }
}
