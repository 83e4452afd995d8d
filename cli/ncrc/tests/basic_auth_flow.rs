// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

mod common;

use common::{against, settings, FakeConda, Prompt};
use httpmock::prelude::*;
use ncrc::commands::Network;
use ncrc::{Client, Command, Invocation};
use securid::{CookieStore, SessionOptions};
use std::fs;

const SECRET: &str = "jdoe:123456@";

#[tokio::test]
async fn basic_auth_install_scrubs_embedded_credentials() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let conda = FakeConda::new(dir.path());
    let base = server.base_url();
    let authority = base.trim_start_matches("http://");

    let envs = dir.path().join("envs");
    let pkgs = dir.path().join("pkgs");
    let meta = envs.join("moose/conda-meta/ncrc-moose-2023.02.01-build_0.json");
    let record = pkgs.join("ncrc-moose-2023.02.01-build_0/info/repodata_record.json");
    let urls = pkgs.join("urls.txt");
    fs::create_dir_all(meta.parent().unwrap()).unwrap();
    fs::create_dir_all(record.parent().unwrap()).unwrap();

    let leaked = serde_json::json!({
        "name": "ncrc-moose",
        "channel": format!("http://{}{}/ncrc-moose", SECRET, authority),
    })
    .to_string();
    for file in [&meta, &record] {
        fs::write(file, &leaked).unwrap();
    }
    fs::write(&urls, format!("http://{}{}/ncrc-moose/linux-64/x.conda\n", SECRET, authority)).unwrap();

    conda.respond(
        "info.json",
        &serde_json::json!({
            "root_prefix": dir.path().join("root"),
            "envs_dirs": [envs],
            "pkgs_dirs": [pkgs],
        })
        .to_string(),
    );

    let channel = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/ncrc-moose/")
                .header_exists("authorization");
            then.status(200);
        })
        .await;
    let login = server
        .mock_async(|when, then| {
            when.method(GET).path("/webauthentication");
            then.status(200);
        })
        .await;

    let client = Client::with_parts(
        settings(
            Command::Install,
            Invocation {
                basic_auth: true,
                ..against(&base, Some("moose"))
            },
            Some("base"),
        ),
        conda.conda(),
        Some(Network {
            store: CookieStore::new(dir.path().join("cookies")),
            options: SessionOptions::default(),
        }),
        dir.path().join("cache"),
    );

    let mut prompt = Prompt::with("jdoe", "123456");
    client.run(&mut prompt).await.unwrap();

    assert_eq!(prompt.calls, 1);
    channel.assert_hits_async(1).await;
    login.assert_hits_async(0).await;

    let calls = conda.calls();
    assert_eq!(calls.len(), 4, "{:#?}", calls);
    assert_eq!(calls[0], "--version");
    assert!(calls[1].starts_with("create --yes --name moose --channel http://jdoe:123456@"));
    assert!(calls[1].ends_with("--strict-channel-priority ncrc-moose"));
    assert_eq!(calls[2], "info --json");
    assert_eq!(calls[3], "clean --all --yes");

    for file in [&meta, &record] {
        let scrubbed = fs::read_to_string(file).unwrap();
        assert!(!scrubbed.contains(SECRET), "{}", file.display());
        let json: serde_json::Value = serde_json::from_str(&scrubbed).unwrap();
        assert_eq!(json["channel"], format!("http://{}/ncrc-moose", authority));
    }
    assert!(!fs::read_to_string(&urls).unwrap().contains(SECRET));
}
