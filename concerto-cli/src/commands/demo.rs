//! Replay requests against an engine over small in-memory concepts.

use anyhow::{Context, Result};
use concerto_engine::rule::RuleFile;
use concerto_engine::{record, Engine, EngineConfig, FnConcept, Output, Record};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const FRIENDS_RULES: &str = include_str!("../../rules/friends.yml");
const DEFAULT_SCRIPT: &str = include_str!("../../rules/demo.yml");

/// Sessions and a symmetric friend relation
struct Directory {
    sessions: HashMap<String, String>,
    friendships: Mutex<BTreeSet<(String, String)>>,
}

impl Directory {
    fn seeded() -> Self {
        let sessions = [("s1", "alice"), ("s2", "bob"), ("s3", "carol")]
            .into_iter()
            .map(|(session, user)| (session.to_string(), user.to_string()))
            .collect();
        let directory = Directory {
            sessions,
            friendships: Mutex::new(BTreeSet::new()),
        };
        directory.link("alice", "bob");
        directory.link("alice", "carol");
        directory
    }

    /// Returns false when the pair was already linked
    fn link(&self, a: &str, b: &str) -> bool {
        let mut friendships = self.friendships.lock();
        let added = friendships.insert((a.to_string(), b.to_string()));
        friendships.insert((b.to_string(), a.to_string()));
        added
    }

    /// Returns false when the pair was not linked
    fn unlink(&self, a: &str, b: &str) -> bool {
        let mut friendships = self.friendships.lock();
        let removed = friendships.remove(&(a.to_string(), b.to_string()));
        friendships.remove(&(b.to_string(), a.to_string()));
        removed
    }

    fn friends_of(&self, user: &str) -> Vec<String> {
        self.friendships
            .lock()
            .iter()
            .filter(|(a, _)| a == user)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

fn text(input: &Record, field: &str) -> String {
    input
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn sessioning(directory: Arc<Directory>) -> FnConcept {
    FnConcept::new("Sessioning").query("_getUser", move |input| {
        let directory = directory.clone();
        async move {
            Ok(directory
                .sessions
                .get(&text(&input, "session"))
                .map(|user| vec![record! { "user" => user.clone() }])
                .unwrap_or_default())
        }
    })
}

fn friends(directory: Arc<Directory>) -> FnConcept {
    let adding = directory.clone();
    let removing = directory.clone();
    FnConcept::new("Friends")
        .action("addFriend", move |input| {
            let directory = adding.clone();
            async move {
                let (user, friend) = (text(&input, "user"), text(&input, "friend"));
                if user == friend {
                    Output::error("cannot befriend yourself")
                } else if directory.link(&user, &friend) {
                    Output::empty()
                } else {
                    Output::error("already friends")
                }
            }
        })
        .action("removeFriend", move |input| {
            let directory = removing.clone();
            async move {
                if directory.unlink(&text(&input, "user"), &text(&input, "friend")) {
                    Output::empty()
                } else {
                    Output::error("not friends")
                }
            }
        })
        .query("_getFriends", move |input| {
            let directory = directory.clone();
            async move {
                Ok(directory
                    .friends_of(&text(&input, "user"))
                    .into_iter()
                    .map(|friend| record! { "friend" => friend })
                    .collect())
            }
        })
}

#[derive(Serialize)]
struct Exchange {
    request: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

/// Build the demo engine and replay `script` (or the built-in requests).
pub async fn run_demo(config: EngineConfig, script: Option<&Path>) -> Result<()> {
    let requests: Vec<Record> = match script {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read script {}", path.display()))?;
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse script {}", path.display()))?
        }
        None => serde_yaml::from_str(DEFAULT_SCRIPT).context("Failed to parse built-in script")?,
    };

    let file = RuleFile::from_yaml_str(FRIENDS_RULES).context("Failed to parse demo rules")?;
    let directory = Arc::new(Directory::seeded());
    let engine = Engine::builder()
        .config(config)
        .concept(sessioning(directory.clone()))
        .concept(friends(directory))
        .rules(file.rules)
        .build()
        .context("Failed to start engine")?;

    info!(requests = requests.len(), "replaying demo script");
    for request in requests {
        let exchange = match engine.request(request.clone()).await {
            Ok(response) => Exchange {
                request,
                response: Some(response),
                failure: None,
            },
            Err(err) => Exchange {
                request,
                response: None,
                failure: Some(err.to_string()),
            },
        };
        println!("{}", serde_json::to_string(&exchange)?);
    }

    engine.settled().await;
    println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    Ok(())
}
