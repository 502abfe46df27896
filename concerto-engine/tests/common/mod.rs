//! Shared fixtures: small in-memory concepts and the rules that compose them

#![allow(dead_code)]

use concerto_engine::pattern::Pattern;
use concerto_engine::rule::{ActionTemplate, Rule};
use concerto_engine::types::{lit, var};
use concerto_engine::where_step::{CollectStep, Predicate, QueryStep};
use concerto_engine::{record, Engine, EngineConfig, FnConcept, Output, Record};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mutable state behind the fixture concepts
#[derive(Default)]
pub struct World {
    pub sessions: HashMap<String, String>,
    pub friendships: Mutex<BTreeSet<(String, String)>>,
    pub notified: Mutex<Vec<Record>>,
    next_post: AtomicU64,
}

impl World {
    /// Sessions s1..s4 for users u1..u4; u1 is friends with u2 and u3
    pub fn new() -> Arc<Self> {
        let world = World {
            sessions: (1..=4).map(|i| (format!("s{i}"), format!("u{i}"))).collect(),
            ..World::default()
        };
        world.befriend("u1", "u2");
        world.befriend("u1", "u3");
        Arc::new(world)
    }

    pub fn befriend(&self, a: &str, b: &str) {
        let mut friendships = self.friendships.lock();
        friendships.insert((a.to_string(), b.to_string()));
        friendships.insert((b.to_string(), a.to_string()));
    }

    pub fn are_friends(&self, a: &str, b: &str) -> bool {
        self.friendships
            .lock()
            .contains(&(a.to_string(), b.to_string()))
    }
}

fn text(input: &Record, field: &str) -> String {
    input
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn sessioning(world: Arc<World>) -> FnConcept {
    FnConcept::new("Sessioning").query("_getUser", move |input| {
        let world = world.clone();
        async move {
            Ok(world
                .sessions
                .get(&text(&input, "session"))
                .map(|user| vec![record! { "user" => user.clone() }])
                .unwrap_or_default())
        }
    })
}

pub fn friends(world: Arc<World>) -> FnConcept {
    let for_query = world.clone();
    FnConcept::new("Friends")
        .action("removeFriend", move |input| {
            let world = world.clone();
            async move {
                let (user, friend) = (text(&input, "user"), text(&input, "friend"));
                let mut friendships = world.friendships.lock();
                if friendships.remove(&(user.clone(), friend.clone())) {
                    friendships.remove(&(friend, user));
                    Output::empty()
                } else {
                    Output::error("not friends")
                }
            }
        })
        .query("_getFriends", move |input| {
            let world = for_query.clone();
            async move {
                let user = text(&input, "user");
                Ok(world
                    .friendships
                    .lock()
                    .iter()
                    .filter(|(a, _)| *a == user)
                    .map(|(_, b)| record! { "friend" => b.clone() })
                    .collect())
            }
        })
}

pub fn posts(world: Arc<World>) -> FnConcept {
    FnConcept::new("Post").action("create", move |input| {
        let world = world.clone();
        async move {
            if text(&input, "content").is_empty() {
                return Output::error("content must not be empty");
            }
            let n = world.next_post.fetch_add(1, Ordering::SeqCst) + 1;
            Output::success(record! { "post" => format!("post-{n}") })
        }
    })
}

pub fn notifications(world: Arc<World>) -> FnConcept {
    FnConcept::new("Notification").action("notify", move |input| {
        let world = world.clone();
        async move {
            world.notified.lock().push(input);
            Output::empty()
        }
    })
}

fn request_on(path: &str) -> Pattern {
    Pattern::on("Requesting", "request")
        .input("path", lit(path))
        .output("request", var("request"))
}

fn current_user() -> QueryStep {
    QueryStep::new("Sessioning", "_getUser")
        .input("session", var("session"))
        .bind("user", "user")
}

fn respond() -> ActionTemplate {
    ActionTemplate::on("Requesting", "respond").input("request", var("request"))
}

pub fn rules() -> Vec<Rule> {
    vec![
        Rule::named("RemoveFriendRequest")
            .when(
                request_on("/Friends/removeFriend")
                    .input("session", var("session"))
                    .input("friend", var("friend")),
            )
            .where_step(current_user())
            .where_step(Predicate::ne(var("user"), var("friend")))
            .then(
                ActionTemplate::on("Friends", "removeFriend")
                    .input("user", var("user"))
                    .input("friend", var("friend"))
                    .input("request", var("request")),
            ),
        Rule::named("RemoveFriendResponse")
            .when(request_on("/Friends/removeFriend"))
            .when(
                Pattern::on("Friends", "removeFriend")
                    .input("request", var("request"))
                    .succeeded(),
            )
            .then(respond().input("msg", lit("Friend removed"))),
        Rule::named("RemoveFriendError")
            .when(request_on("/Friends/removeFriend"))
            .when(
                Pattern::on("Friends", "removeFriend")
                    .input("request", var("request"))
                    .failed(var("error")),
            )
            .then(respond().input("error", var("error"))),
        Rule::named("CreatePostRequest")
            .when(
                request_on("/Post/create")
                    .input("session", var("session"))
                    .input("content", var("content")),
            )
            .where_step(current_user())
            .then(
                ActionTemplate::on("Post", "create")
                    .input("author", var("user"))
                    .input("content", var("content"))
                    .input("request", var("request")),
            ),
        Rule::named("CreatePostResponse")
            .when(request_on("/Post/create"))
            .when(
                Pattern::on("Post", "create")
                    .input("request", var("request"))
                    .output("post", var("post")),
            )
            .then(respond().input("post", var("post"))),
        Rule::named("CreatePostError")
            .when(request_on("/Post/create"))
            .when(
                Pattern::on("Post", "create")
                    .input("request", var("request"))
                    .failed(var("error")),
            )
            .then(respond().input("error", var("error"))),
        Rule::named("NotifyFriendsOfPost")
            .when(
                Pattern::on("Post", "create")
                    .input("author", var("author"))
                    .output("post", var("post")),
            )
            .where_step(
                QueryStep::new("Friends", "_getFriends")
                    .input("user", var("author"))
                    .bind("friend", "friend"),
            )
            .then(
                ActionTemplate::on("Notification", "notify")
                    .input("to", var("friend"))
                    .input("post", var("post")),
            ),
        Rule::named("GetFriends")
            .when(request_on("/Friends/_getFriends").input("session", var("session")))
            .where_step(current_user())
            .where_step(
                CollectStep::new("Friends", "_getFriends", "friends")
                    .input("user", var("user"))
                    .field("friend"),
            )
            .then(respond().input("friends", var("friends"))),
    ]
}

/// An engine over a fresh world with the fixture rules
pub fn engine_with(config: EngineConfig) -> (Engine, Arc<World>) {
    let world = World::new();
    let engine = Engine::builder()
        .config(config)
        .concept(sessioning(world.clone()))
        .concept(friends(world.clone()))
        .concept(posts(world.clone()))
        .concept(notifications(world.clone()))
        .rules(rules())
        .build()
        .expect("fixture rules are valid");
    (engine, world)
}

pub fn engine() -> (Engine, Arc<World>) {
    engine_with(EngineConfig {
        request_timeout_ms: 5_000,
        ..EngineConfig::default()
    })
}
