use assert_cmd::prelude::*;
use predicates::function::function;
use predicates::str::{contains, is_empty};
use std::process::Command;

mod common;

fn client(addr: std::net::SocketAddr) -> Command {
    let mut cmd = Command::cargo_bin("geostore-client").unwrap();
    cmd.args(["--addr", &addr.to_string()]);
    cmd
}

#[test]
fn client_cli_no_args() {
    Command::cargo_bin("geostore-client")
        .unwrap()
        .assert()
        .failure();
}

#[test]
fn server_cli_version() {
    Command::cargo_bin("geostore-server")
        .unwrap()
        .args(["-V"])
        .assert()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn server_cli_rejects_unknown_engine() {
    Command::cargo_bin("geostore-server")
        .unwrap()
        .args(["--engine", "redis"])
        .assert()
        .failure();
}

#[test]
fn ingest_then_latest() {
    let addr = common::start_server();

    client(addr)
        .args(["ingest", "item-id-1", "[-26.13213, -46.31423]"])
        .assert()
        .success()
        .stdout(is_empty());
    client(addr)
        .args(["ingest", "item-id-1", "[\"1.5\", \"2.5\"]"])
        .assert()
        .success();

    client(addr)
        .args(["latest", "item-id-1"])
        .assert()
        .success()
        .stdout("[[1.5,2.5],[-26.13213,-46.31423]]\n");
}

#[test]
fn latest_of_unknown_item_is_empty() {
    let addr = common::start_server();
    client(addr)
        .args(["latest", "nobody"])
        .assert()
        .success()
        .stdout("[]\n");
}

#[test]
fn rejected_requests_exit_with_one() {
    let addr = common::start_server();

    client(addr)
        .args(["ingest", "undefined", "[1, 2]"])
        .assert()
        .code(1)
        .stderr(contains("Invalid item id"));
    client(addr)
        .args(["latest", "undefined"])
        .assert()
        .code(1)
        .stderr(contains("Invalid item id"));
    client(addr)
        .args(["ingest", "item", "[1, 2, 3]"])
        .assert()
        .code(1)
        .stderr(contains("Invalid request body"));
    client(addr)
        .args(["ingest", "item", "not json"])
        .assert()
        .code(1)
        .stderr(contains("Invalid request body"));
}

#[test]
fn unreachable_store_exits_with_two() {
    client(common::dead_addr())
        .args(["latest", "item"])
        .assert()
        .code(2)
        .stderr(function(|err: &str| {
            err.lines().filter(|line| line.starts_with("IO error")).count() == 1
        }));
}

#[test]
fn ingest_works_against_a_single_worker_server() {
    let addr = common::start_server_with(geostore::MemoryEngine::new(), 1);
    client(addr)
        .args(["ingest", "item", "[1.5, 2.5]"])
        .assert()
        .success();
    client(addr)
        .args(["latest", "item"])
        .assert()
        .success()
        .stdout("[[1.5,2.5]]\n");
}
