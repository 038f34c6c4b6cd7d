use std::collections::HashMap;
use std::time::Duration;

use latchkey::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// A scripted sequence of requests
// ---------------------------------------------------------------------------

/// One incoming request. `token` is whatever the client sent back; `"$alice"`
/// refers to the token handed to Alice by an earlier response.
#[derive(Deserialize)]
struct Request {
    who: String,
    action: Action,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum Action {
    Visit,
    Login,
    Logout,
}

#[derive(Serialize)]
struct Response<'a> {
    who: &'a str,
    acquired: &'static str,
    roles: Vec<String>,
    placement: Option<TokenPlacement>,
}

const SCRIPT: &str = r#"[
    { "who": "alice", "action": "visit" },
    { "who": "alice", "action": "login", "token": "$alice" },
    { "who": "bob",   "action": "visit", "token": "forged-token" },
    { "who": "alice", "action": "visit", "token": "$alice" },
    { "who": "alice", "action": "logout", "token": "$alice" },
    { "who": "alice", "action": "visit", "token": "$alice" }
]"#;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    latchkey::telemetry::init();

    let props: HashMap<String, String> = [
        (keys::TIMEOUT, "2"),
        (keys::CLEAN_INTERVAL, "1"),
        (keys::TOKEN_LABEL, "sid"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let service = SessionService::builder()
        .properties(Layered(EnvProperties::default(), props))
        .on_close_encoded("audit", JsonCodec, |bytes| {
            info!(snapshot = %String::from_utf8_lossy(&bytes), "audit: session closed");
            Ok(())
        })
        .build_plain();

    let requests: Vec<Request> = serde_json::from_str(SCRIPT)?;
    let mut issued: HashMap<String, String> = HashMap::new();

    for request in &requests {
        let presented = request.token.as_deref().map(|t| match t.strip_prefix('$') {
            Some(name) => issued.get(name).map(String::as_str).unwrap_or(""),
            None => t,
        });

        let (mut session, acquired) = service.begin(presented)?;
        match request.action {
            Action::Visit => {}
            Action::Login => session.roles().add("member"),
            Action::Logout => {
                session.close();
            }
        }

        let response = Response {
            who: &request.who,
            acquired: match acquired {
                Acquired::Loaded => "loaded",
                Acquired::Opened => "opened",
            },
            roles: session.roles().names(),
            placement: session.placement(),
        };
        println!("{}", serde_json::to_string(&response)?);

        if session.is_bound() {
            issued.insert(request.who.clone(), session.token().to_string());
        }
    }

    info!(status = ?service.status(), "idling until the sweeper reclaims everything");
    tokio::time::sleep(Duration::from_secs(4)).await;
    println!("{}", serde_json::to_string(&service.status())?);

    service.shutdown().await?;
    Ok(())
}
