//! Catalog operations end to end against a scripted daemon.

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use openfdd_core::{
    Action, CatalogError, Device, Param, Session, SessionError, list_action_params,
    list_actions, list_devices, run_action,
};
use openfdd_test_utils::{MockDaemon, Reply, TestConfigBuilder};

fn device(id: &str, name: &str) -> Device {
    Device {
        id: id.to_string(),
        name: name.to_string(),
    }
}

#[test_log::test(tokio::test)]
async fn test_list_devices_in_order() {
    let daemon = MockDaemon::builder()
        .reply("list-devices", "dev1,Lamp\ndev2,Fan\ndone\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let devices = list_devices(&mut session).await.unwrap();
    assert_eq!(devices, vec![device("dev1", "Lamp"), device("dev2", "Fan")]);
    assert_eq!(daemon.received(), vec!["list-devices".to_string()]);
}

#[test_log::test(tokio::test)]
async fn test_empty_listings() {
    let daemon = MockDaemon::builder()
        .reply("list-devices", "done\n")
        .reply("list-actions,dev1", "done\n")
        .reply("list-action-params,dev1,on", "done\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    assert!(list_devices(&mut session).await.unwrap().is_empty());
    assert!(list_actions(&mut session, "dev1").await.unwrap().is_empty());
    assert!(
        list_action_params(&mut session, "dev1", "on")
            .await
            .unwrap()
            .is_empty()
    );
}

#[test_log::test(tokio::test)]
async fn test_record_with_done_in_later_field_is_data() {
    let daemon = MockDaemon::builder()
        .reply("list-devices", "dev3,done\ndone\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let devices = list_devices(&mut session).await.unwrap();
    assert_eq!(devices, vec![device("dev3", "done")]);
}

#[test_log::test(tokio::test)]
async fn test_escaped_fields_in_records() {
    let daemon = MockDaemon::builder()
        .reply("list-devices", "dev1,Lamp\\, desk\ndev\\\\2,Fan\ndone\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let devices = list_devices(&mut session).await.unwrap();
    assert_eq!(
        devices,
        vec![device("dev1", "Lamp, desk"), device("dev\\2", "Fan")]
    );
}

#[test_log::test(tokio::test)]
async fn test_fail_short_circuits_and_keeps_session() {
    let daemon = MockDaemon::builder()
        .reply("list-actions,X", "fail,no such device\n")
        .reply("list-devices", "dev1,Lamp\ndone\n")
        .start()
        .await;
    // A silent daemon after `fail` would time out if the client kept reading.
    let config = TestConfigBuilder::new()
        .socket_path(daemon.socket_path())
        .read_timeout_ms(200)
        .build();
    let mut session = Session::open(&config).await.unwrap();

    let err = list_actions(&mut session, "X").await.unwrap_err();
    match &err {
        CatalogError::OperationFailed { command, reason } => {
            assert_eq!(command, "list-actions,X");
            assert_eq!(reason, "no such device");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_fatal());
    assert!(session.is_open());

    let devices = list_devices(&mut session).await.unwrap();
    assert_eq!(devices, vec![device("dev1", "Lamp")]);
}

#[test_log::test(tokio::test)]
async fn test_fail_without_reason() {
    let daemon = MockDaemon::builder()
        .reply("list-devices", "fail\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let err = list_devices(&mut session).await.unwrap_err();
    assert!(matches!(err, CatalogError::OperationFailed { reason, .. } if reason.is_empty()));
}

#[test_log::test(tokio::test)]
async fn test_fail_reason_keeps_escaped_commas() {
    let daemon = MockDaemon::builder()
        .reply("list-actions,dev1", "fail,bad id\\, try dev2,code 7\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let err = list_actions(&mut session, "dev1").await.unwrap_err();
    assert!(
        matches!(&err, CatalogError::OperationFailed { reason, .. } if reason == "bad id\\, try dev2,code 7"),
        "unexpected error: {err}"
    );
}

#[test_log::test(tokio::test)]
async fn test_list_actions_via_device() {
    let daemon = MockDaemon::builder()
        .reply(
            "list-actions,dev1",
            "on,Turn on,Powers the lamp\ndim,Dim,Sets brightness\\, 0-100\ndone\n",
        )
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let actions = device("dev1", "Lamp").actions(&mut session).await.unwrap();
    assert_eq!(
        actions,
        vec![
            Action {
                id: "on".into(),
                name: "Turn on".into(),
                description: "Powers the lamp".into(),
                device_id: "dev1".into(),
            },
            Action {
                id: "dim".into(),
                name: "Dim".into(),
                description: "Sets brightness, 0-100".into(),
                device_id: "dev1".into(),
            },
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_list_params_preserves_type_info() {
    let daemon = MockDaemon::builder()
        .reply(
            "list-action-params,dev1,dim",
            "level,Brightness,int,0,100\nmode,Fade mode,enum,linear,ease\nlabel,Note,string\ndone\n",
        )
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let params = list_action_params(&mut session, "dev1", "dim").await.unwrap();
    assert_eq!(
        params,
        vec![
            Param {
                name: "level".into(),
                description: "Brightness".into(),
                kind: "int".into(),
                type_info: vec!["int".into(), "0".into(), "100".into()],
            },
            Param {
                name: "mode".into(),
                description: "Fade mode".into(),
                kind: "enum".into(),
                type_info: vec!["enum".into(), "linear".into(), "ease".into()],
            },
            Param {
                name: "label".into(),
                description: "Note".into(),
                kind: "string".into(),
                type_info: vec!["string".into()],
            },
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_malformed_record_drains_to_terminal() {
    let daemon = MockDaemon::builder()
        .reply("list-devices", "dev1,Lamp\norphan\ndev2,Fan\ndone\n")
        .reply("list-actions,dev1", "done\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let err = list_devices(&mut session).await.unwrap_err();
    match err {
        CatalogError::MalformedRecord { command, fields, .. } => {
            assert_eq!(command, "list-devices");
            assert_eq!(fields, vec!["orphan".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The listing was drained, so the next exchange lines up.
    assert!(list_actions(&mut session, "dev1").await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_stream_closing_mid_listing_is_truncation() {
    let daemon = MockDaemon::builder()
        .reply_then_hang_up("list-devices", "dev1,Lamp\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let err = list_devices(&mut session).await.unwrap_err();
    assert!(matches!(
        &err,
        CatalogError::Session(SessionError::TruncatedFrame { command }) if command == "list-devices"
    ));
    assert!(err.is_fatal());
    assert!(!session.is_open());
}

#[test_log::test(tokio::test)]
async fn test_run_action_sends_positional_values() {
    let daemon = MockDaemon::builder()
        .reply("action-run,dev1,a1,5,on,", "done\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    run_action(&mut session, "dev1", "a1", &["5", "on"])
        .await
        .unwrap();
    assert_eq!(daemon.received(), vec!["action-run,dev1,a1,5,on,".to_string()]);
}

#[test_log::test(tokio::test)]
async fn test_run_action_without_values() {
    let daemon = MockDaemon::builder()
        .reply("action-run,dev1,toggle,", "done\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    run_action::<&str>(&mut session, "dev1", "toggle", &[])
        .await
        .unwrap();
}

#[test_log::test(tokio::test)]
async fn test_run_action_failure_keeps_session() {
    let daemon = MockDaemon::builder()
        .reply("action-run,dev1,a1,bogus,", "fail,bad value\n")
        .reply("list-devices", "done\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let err = run_action(&mut session, "dev1", "a1", &["bogus"])
        .await
        .unwrap_err();
    match &err {
        CatalogError::ActionRunFailed { command, response } => {
            assert_eq!(command, "action-run,dev1,a1,bogus,");
            assert_eq!(response, &vec!["fail".to_string(), "bad value".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_fatal());
    assert!(list_devices(&mut session).await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_run_action_rejects_non_done_data_frame() {
    let daemon = MockDaemon::builder()
        .reply("action-run,dev1,a1,", "busy\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let err = run_action::<&str>(&mut session, "dev1", "a1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::ActionRunFailed { response, .. } if response == ["busy"]));
}

#[test_log::test(tokio::test)]
async fn test_run_named_orders_by_descriptors() {
    let daemon = MockDaemon::builder()
        .reply(
            "list-action-params,dev1,dim",
            "level,Brightness,int,0,100\nmode,Fade mode,enum,linear,ease\ndone\n",
        )
        .reply("action-run,dev1,dim,40,ease,", "done\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();
    let action = Action {
        id: "dim".into(),
        name: "Dim".into(),
        description: String::new(),
        device_id: "dev1".into(),
    };

    let named = HashMap::from([
        ("mode".to_string(), "ease".to_string()),
        ("level".to_string(), "40".to_string()),
    ]);
    action.run_named(&mut session, &named).await.unwrap();

    assert_eq!(
        daemon.received(),
        vec![
            "list-action-params,dev1,dim".to_string(),
            "action-run,dev1,dim,40,ease,".to_string(),
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_run_named_missing_value_sends_nothing() {
    let daemon = MockDaemon::builder()
        .reply("list-action-params,dev1,dim", "level,Brightness,int\ndone\n")
        .fallback(Reply::Hangup)
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();
    let action = Action {
        id: "dim".into(),
        name: "Dim".into(),
        description: String::new(),
        device_id: "dev1".into(),
    };

    let err = action
        .run_named(&mut session, &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::MissingParam { name } if name == "level"));
    assert_eq!(daemon.received(), vec!["list-action-params,dev1,dim".to_string()]);
    assert!(session.is_open());
}

#[test_log::test(tokio::test)]
async fn test_browse_tree_on_one_session() {
    let daemon = MockDaemon::builder()
        .reply("list-devices", "dev1,Lamp\ndone\n")
        .reply("list-actions,dev1", "on,Turn on,Powers the lamp\ndone\n")
        .reply("list-action-params,dev1,on", "done\n")
        .start()
        .await;
    let mut session = Session::open(&daemon.config()).await.unwrap();

    let devices = list_devices(&mut session).await.unwrap();
    let actions = devices[0].actions(&mut session).await.unwrap();
    let params = actions[0].params(&mut session).await.unwrap();
    assert!(params.is_empty());

    // No run is scripted, so the mock answers with its `fail` fallback.
    let err = actions[0].run::<&str>(&mut session, &[]).await.unwrap_err();
    assert!(matches!(err, CatalogError::ActionRunFailed { .. }));
    assert_eq!(daemon.received().last().map(String::as_str), Some("action-run,dev1,on,"));
}
