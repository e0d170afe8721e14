use std::collections::HashSet;

use redis_fixture::RedisServer;
use redis_fixture::redis::{self, AsyncCommands as _};
use rstest::rstest;
use testsuite::fake_server::fake_server_config_in;
use testsuite::logging::init_logging;
use testsuite::process::is_empty_dir;
use tokio::task::JoinSet;

#[rstest]
#[case(2)]
#[case(8)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_servers_are_isolated(#[case] count: usize) {
    init_logging();

    let root = tempfile::tempdir().unwrap();

    let mut tasks = JoinSet::new();

    for idx in 0..count {
        let config = fake_server_config_in(root.path());

        tasks.spawn(async move {
            let server = RedisServer::start_with(config).await.unwrap();

            let key = format!("key-{idx}");
            let mut conn = server.pool().get().await.unwrap();
            let () = conn.set(&key, "value").await.unwrap();
            let size: i64 = redis::cmd("DBSIZE").query_async(&mut *conn).await.unwrap();
            assert_eq!(size, 1);
            drop(conn);

            server
        });
    }

    let servers = tasks.join_all().await;

    let workspaces: HashSet<_> = servers.iter().map(|server| server.workspace_dir().to_owned()).collect();
    let endpoints: HashSet<_> = servers.iter().map(|server| server.endpoint().clone()).collect();
    assert_eq!(workspaces.len(), count);
    assert_eq!(endpoints.len(), count);

    for server in servers {
        server.stop().await.unwrap();
    }

    assert!(is_empty_dir(root.path()));
}
