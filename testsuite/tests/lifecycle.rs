use redis_fixture::redis::{self, AsyncCommands as _};
use redis_fixture::{RedisServer, stop_if_started};
use testsuite::fake_server::{fake_server_config, fake_server_config_in};
use testsuite::logging::init_logging;
use testsuite::process::{is_empty_dir, pid_exists};

#[tokio::test]
async fn pooled_connection_answers_ping() {
    init_logging();

    let server = RedisServer::start_with(fake_server_config()).await.unwrap();

    let mut conn = server.pool().get().await.unwrap();
    let pong: String = redis::cmd("PING").query_async(&mut *conn).await.unwrap();
    assert_eq!(pong, "PONG");
    drop(conn);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn pool_and_direct_connections_share_the_server() {
    init_logging();

    let server = RedisServer::start_with(fake_server_config()).await.unwrap();

    let mut pooled = server.pool().get().await.unwrap();
    let () = pooled.set("foo", "bar").await.unwrap();

    let mut second = server.pool().get().await.unwrap();
    let value: String = second.get("foo").await.unwrap();
    assert_eq!(value, "bar");
    drop(second);
    drop(pooled);

    let endpoint = server.endpoint();
    assert_eq!(endpoint.network(), "unix");
    assert!(endpoint.address().starts_with(server.workspace_dir()));

    // What an unrelated client would do with the published network and address.
    let url = format!("redis+{}://{}", endpoint.network(), endpoint.address().display());
    let mut direct = redis::Client::open(url)
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    let value: Option<String> = direct.get("foo").await.unwrap();
    assert_eq!(value.as_deref(), Some("bar"));

    let mut other = server.connect().await.unwrap();
    let size: i64 = redis::cmd("DBSIZE").query_async(&mut other).await.unwrap();
    assert_eq!(size, 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn configuration_disables_persistence() {
    init_logging();

    let server = RedisServer::start_with(fake_server_config()).await.unwrap();

    let contents = std::fs::read_to_string(server.config_path()).unwrap();
    let socket = server.endpoint().address().display().to_string();

    assert!(contents.contains("port 0\n"), "{contents}");
    assert!(contents.contains(&format!("unixsocket \"{socket}\"\n")), "{contents}");
    assert!(contents.contains("appendonly no\n"), "{contents}");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn workspace_root_with_spaces() {
    init_logging();

    let root = tempfile::tempdir().unwrap();
    let spaced = root.path().join("my \"quoted\" tests");
    std::fs::create_dir(&spaced).unwrap();

    let server = RedisServer::start_with(fake_server_config_in(&spaced)).await.unwrap();
    assert!(server.endpoint().address().starts_with(&spaced));

    let mut conn = server.pool().get().await.unwrap();
    let () = conn.set("foo", "bar").await.unwrap();
    drop(conn);

    server.stop().await.unwrap();

    assert!(is_empty_dir(&spaced));
}

#[tokio::test]
async fn stop_reaps_the_process_and_removes_the_workspace() {
    init_logging();

    let root = tempfile::tempdir().unwrap();
    let server = RedisServer::start_with(fake_server_config_in(root.path())).await.unwrap();

    let pid = server.pid().unwrap();
    let workspace = server.workspace_dir().to_owned();
    assert!(workspace.starts_with(root.path()));
    assert!(pid_exists(pid));

    server.stop().await.unwrap();

    assert!(!pid_exists(pid));
    assert!(!workspace.exists());
    assert!(is_empty_dir(root.path()));
}

#[tokio::test]
async fn stop_if_started_handles_both_cases() {
    init_logging();

    stop_if_started(None).await.unwrap();

    let root = tempfile::tempdir().unwrap();
    let server = RedisServer::start_with(fake_server_config_in(root.path())).await.ok();
    assert!(server.is_some());

    stop_if_started(server).await.unwrap();

    assert!(is_empty_dir(root.path()));
}

#[tokio::test]
async fn dropping_the_server_removes_the_workspace() {
    init_logging();

    let root = tempfile::tempdir().unwrap();
    let server = RedisServer::start_with(fake_server_config_in(root.path())).await.unwrap();

    drop(server);

    assert!(is_empty_dir(root.path()));
}
