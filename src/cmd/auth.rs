use crate::app::{TOKEN_ENV, TOKEN_FILE};
use crate::out;
use crate::vk::VkClient;
use crate::Cli;
use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    /// Access token (prompted interactively when omitted)
    #[arg(long)]
    pub token: Option<String>,

    /// Skip the validation call against the platform
    #[arg(long, default_value_t = false)]
    pub no_verify: bool,
}

pub async fn run(cli: &Cli, args: &AuthArgs) -> Result<()> {
    let store_dir = cli.store_dir();
    std::fs::create_dir_all(&store_dir)?;

    let token = match &args.token {
        Some(t) => t.trim().to_string(),
        None => rpassword::prompt_password("VK access token: ")
            .context("Failed to read token from terminal")?
            .trim()
            .to_string(),
    };
    if token.is_empty() {
        anyhow::bail!("Empty token");
    }

    if !args.no_verify {
        let vk = VkClient::new(token.clone())?;
        // users.get with no ids returns the token's own profile.
        vk.method("users.get", &[])
            .await
            .context("Token validation failed")?;
    }

    let path = format!("{}/{}", store_dir, TOKEN_FILE);
    std::fs::write(&path, format!("{}\n", token))
        .with_context(|| format!("Failed to write {}", path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    if cli.output.is_json() {
        out::write_json(&serde_json::json!({
            "authenticated": true,
            "token_file": path,
        }))?;
    } else if !cli.output.is_none() {
        println!("Token saved to {}.", path);
        println!("The {} environment variable takes precedence when set.", TOKEN_ENV);
    }
    Ok(())
}
