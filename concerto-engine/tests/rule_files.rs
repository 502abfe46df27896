//! Engines configured from YAML files

mod common;

use concerto_engine::{record, BuildError, Engine, EngineConfig, RuleError, RuleFile};
use std::fs;
use tempfile::tempdir;

const RULES: &str = r#"
concepts:
  - name: Sessioning
    queries: [_getUser]
  - name: Friends
    actions: [removeFriend]
    queries: [_getFriends]
rules:
  - name: RemoveFriendRequest
    when:
      - action: Requesting/request
        input: { path: /Friends/removeFriend, session: "?session", friend: "?friend" }
        output: { request: "?request" }
    where:
      - query:
          query: Sessioning/_getUser
          input: { session: "?session" }
          output: { user: "?user" }
      - filter:
          ne: ["?user", "?friend"]
    then:
      - action: Friends/removeFriend
        input: { user: "?user", friend: "?friend", request: "?request" }
  - name: RemoveFriendResponse
    when:
      - action: Requesting/request
        input: { path: /Friends/removeFriend }
        output: { request: "?request" }
      - action: Friends/removeFriend
        input: { request: "?request" }
        output: {}
    then:
      - action: Requesting/respond
        input: { request: "?request", msg: Friend removed }
  - name: RemoveFriendError
    when:
      - action: Requesting/request
        input: { path: /Friends/removeFriend }
        output: { request: "?request" }
      - action: Friends/removeFriend
        input: { request: "?request" }
        output: { error: "?error" }
    then:
      - action: Requesting/respond
        input: { request: "?request", error: "?error" }
"#;

#[tokio::test]
async fn test_engine_from_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("rules.yml"), RULES)?;
    fs::write(
        dir.path().join("concerto.yml"),
        "request_timeout_ms: 2000\nstrict_acyclic: true\n",
    )?;

    let config = EngineConfig::from_file(dir.path().join("concerto.yml"))?;
    let file = RuleFile::from_file(dir.path().join("rules.yml"))?;
    file.validate(config.strict_acyclic)?;

    let world = common::World::new();
    let engine = Engine::builder()
        .config(config)
        .concept(common::sessioning(world.clone()))
        .concept(common::friends(world.clone()))
        .rules(file.rules)
        .build()?;

    let ok = engine
        .request(record! { "path" => "/Friends/removeFriend", "session" => "s1", "friend" => "u3" })
        .await?;
    assert_eq!(ok, record! { "msg" => "Friend removed" });

    let err = engine
        .request(record! { "path" => "/Friends/removeFriend", "session" => "s1", "friend" => "u3" })
        .await?;
    assert_eq!(err, record! { "error" => "not friends" });
    Ok(())
}

#[tokio::test]
async fn test_engine_rejects_rules_for_missing_concepts() {
    let file = RuleFile::from_yaml_str(RULES).unwrap();
    let world = common::World::new();

    // Friends is in the file's catalog but not registered with the engine
    let result = Engine::builder()
        .concept(common::sessioning(world))
        .rules(file.rules)
        .build();
    assert!(matches!(
        result,
        Err(BuildError::Rules(RuleError::UnknownConcept { concept, .. })) if concept == "Friends"
    ));
}

#[tokio::test]
async fn test_strict_config_rejects_cycles() {
    let file = RuleFile::from_yaml_str(
        r#"
concepts:
  - name: Post
    actions: [create]
rules:
  - name: Echo
    when:
      - action: Post/create
        output: { post: "?post" }
    then:
      - action: Post/create
        input: { content: "?post" }
"#,
    )
    .unwrap();
    assert!(file.validate(false).unwrap().cycle.is_some());

    let world = common::World::new();
    let result = Engine::builder()
        .config(EngineConfig {
            strict_acyclic: true,
            ..EngineConfig::default()
        })
        .concept(common::posts(world))
        .rules(file.rules)
        .build();
    assert!(matches!(result, Err(BuildError::Rules(RuleError::Cycle(_)))));
}
