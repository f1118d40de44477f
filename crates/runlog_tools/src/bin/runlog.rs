#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};

use runlog_tools::admin_cli::{execute_command, USAGE};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let subcommand = args.first().ok_or_else(|| USAGE.to_string())?.as_str();
    let arg = args.get(1).map(String::as_str);
    let extra = args.get(2).map(String::as_str);
    let secret = if subcommand == "admin-digest" {
        Some(read_admin_password()?)
    } else {
        None
    };

    let output = execute_command(subcommand, arg, extra, secret.as_deref())?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn read_admin_password() -> Result<String, String> {
    if io::stdin().is_terminal() {
        let value = rpassword::prompt_password("Enter admin password:").map_err(|e| e.to_string())?;
        let confirm =
            rpassword::prompt_password("Repeat admin password:").map_err(|e| e.to_string())?;
        if value != confirm {
            return Err("passwords do not match".to_string());
        }
        Ok(value)
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        let trimmed = input.trim_end_matches(['\r', '\n']).to_string();
        if trimmed.is_empty() {
            return Err("admin password must not be empty".to_string());
        }
        Ok(trimmed)
    }
}
