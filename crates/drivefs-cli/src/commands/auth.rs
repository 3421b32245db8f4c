//! Interactive OAuth authorization.

use std::io::{BufRead, Write};

use drivefs_config::DriveFsConfig;

use crate::session;

/// Print the consent URL, read the code, and store the resulting tokens.
pub async fn run(
    config: &DriveFsConfig,
    code: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = session::tokens(config).await?;

    let code = match code {
        Some(code) => code,
        None => {
            println!("Open this URL in a browser and grant access:");
            println!();
            println!("  {}", tokens.authorization_url().await?);
            println!();
            print!("Authorization code: ");
            std::io::stdout().flush()?;

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line
        }
    };

    let code = code.trim();
    if code.is_empty() {
        return Err("No authorization code entered".into());
    }

    tokens.exchange_code(code).await?;
    println!("Credentials saved to {}", tokens.path().display());

    Ok(())
}
