//! Interactive authorization code login against a real provider.
//!
//! Configure with `OAUTH2_DOMAIN`, `OAUTH2_CLIENT_ID`, `OAUTH2_CALLBACK_URL`,
//! `OAUTH2_GRANT_TYPE` and, for PKCE, `OAUTH2_CODE_VERIFIER`. Open the printed
//! URL, sign in, then paste the full callback URL back into the terminal.

use ras_identity_oauth2::{
    AsyncClient, AuthUrlOptions, AuthorizationCallback, ClientConfig, TokenKind,
};
use std::io::BufRead;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = ClientConfig::from_env("OAUTH2")?;
    let client = AsyncClient::new(config)?;
    let session = client.session("cli-user");

    let login = session.login_url(AuthUrlOptions::new()).await?;
    println!("Open this URL in your browser:\n\n{}\n", login.url);
    println!("Paste the callback URL:");

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let callback = AuthorizationCallback::parse(&line)?;

    let tokens = session.fetch_token(Some(callback)).await?;
    println!("Access token expires at {}", tokens.expires_at);

    let details = session.get_user_details().await?;
    println!("Signed in as {:?} <{:?}>", details.given_name, details.email);

    let permissions = session.get_permissions().await?;
    println!(
        "Organization {:?} grants: {}",
        permissions.org_code,
        permissions.permissions.join(", ")
    );

    let sub = session.get_claim("sub", TokenKind::Access).await?;
    println!("Subject: {:?}", sub.value);

    println!("Log out at: {}", session.logout(None).await?);
    Ok(())
}
