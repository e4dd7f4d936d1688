// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Deserialize;
use serde_json::json;

use super::Envelope;
use crate::error::{Classification, ErrorCode};

#[derive(Debug, PartialEq, Deserialize)]
struct Profile {
    user_id: String,
}

#[test]
fn accepts_backend_field_names() -> anyhow::Result<()> {
    let env: Envelope<serde_json::Value> =
        serde_json::from_value(json!({"code": 0, "msg": "ok", "resp_data": {"user_id": "u1"}}))?;
    assert!(env.is_success());
    assert_eq!(env.message, "ok");
    assert_eq!(env.data, Some(json!({"user_id": "u1"})));
    Ok(())
}

#[test]
fn accepts_canonical_field_names() -> anyhow::Result<()> {
    let env: Envelope<serde_json::Value> =
        serde_json::from_value(json!({"code": 1001, "message": "expired", "data": null}))?;
    assert_eq!(env.classify(), Classification::AuthFailed);
    assert_eq!(env.message, "expired");
    assert!(env.data.is_none());
    Ok(())
}

#[test]
fn missing_message_and_data_default() -> anyhow::Result<()> {
    let env: Envelope<serde_json::Value> = serde_json::from_value(json!({"code": 2002}))?;
    assert_eq!(env.error_code(), Some(ErrorCode::ResourceNotFound));
    assert!(env.message.is_empty());
    assert!(env.data.is_none());
    Ok(())
}

#[test]
fn decode_typed_payload() {
    let env = Envelope::ok(json!({"user_id": "u7"})).decode::<Profile>();
    assert!(env.is_success());
    assert_eq!(env.data, Some(Profile { user_id: "u7".into() }));
}

#[test]
fn decode_mismatched_payload_is_internal_error() {
    let env = Envelope::ok(json!({"unexpected": true})).decode::<Profile>();
    assert_eq!(env.error_code(), Some(ErrorCode::InternalError));
    assert!(env.message.contains("malformed response data"));
    assert!(env.data.is_none());
}

#[test]
fn decode_keeps_failure_code() {
    let raw: Envelope<serde_json::Value> = Envelope::failure(ErrorCode::PermissionDenied, "nope");
    let env = raw.decode::<Profile>();
    assert_eq!(env.code, 1002);
    assert_eq!(env.message, "nope");
}

#[test]
fn internal_error_serializes_canonical_shape() -> anyhow::Result<()> {
    let env: Envelope<()> = Envelope::internal_error("connection refused");
    let value = serde_json::to_value(&env)?;
    assert_eq!(value["code"], 5001);
    assert_eq!(value["message"], "connection refused");
    assert!(value["data"].is_null());
    Ok(())
}
