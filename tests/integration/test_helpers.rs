// tests/integration/test_helpers.rs

//! Test helpers shared by every integration test: a `TestContext` wiring
//! a real `Server` (and its default database 0) up the way a connection
//! loop would, minus the socket.

use ridgekv::command::line::to_command_line;
use ridgekv::config::Config;
use ridgekv::connection::ConnectionState;
use ridgekv::reply::Reply;
use ridgekv::server::Server;

pub struct TestContext {
    pub server: Server,
    pub conn: ConnectionState,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let server = Server::new(config, None, None).expect("server construction should not fail");
        Self {
            server,
            conn: ConnectionState::new(),
        }
    }

    /// Runs an arbitrary command line, e.g. `ctx.cmd(&["SET", "k", "v"]).await`.
    pub async fn cmd(&mut self, parts: &[&str]) -> Reply {
        let line = to_command_line(parts);
        self.server.exec(&mut self.conn, &line).await
    }
}
