//! End-to-end tests for the user service over its HTTP surface, with a
//! real in-process file service behind the avatar path.

mod common;

use breezechatd::cache::{SessionStore, StatusStore, VerifyCodeStore};
use breezechatd::db::Database;
use breezechatd::rpc::{
    FileClient, GetUserInfoReq, GetUserInfoRsp, SetUserAvatarReq, SetUserAvatarRsp, UserLoginReq,
    UserLoginRsp, UserRegisterReq, UserRegisterRsp, UserSearchReq, UserSearchRsp,
};
use breezechatd::services::{FileService, UserService};
use common::{MemEmail, MemUserIndex, OpenAudit, manager_with_replica, spawn_router};
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn_user_service() -> SocketAddr {
    let blob_dir = tempfile::tempdir().unwrap();
    let file_addr = spawn_router(Arc::new(FileService::new(blob_dir.path())).router()).await;
    // The tempdir must outlive the test process' servers.
    std::mem::forget(blob_dir);

    let db = Database::new(":memory:", 2).await.unwrap();
    let service = Arc::new(UserService::new(
        db,
        Arc::new(MemUserIndex::default()),
        Arc::new(SessionStore::new()),
        Arc::new(StatusStore::new()),
        Arc::new(VerifyCodeStore::new()),
        Arc::new(MemEmail::default()),
        Arc::new(OpenAudit),
        Arc::new(FileClient::new(
            manager_with_replica("file", file_addr),
            "file",
        )),
    ));
    spawn_router(service.router()).await
}

async fn post<Req: serde::Serialize, Rsp: serde::de::DeserializeOwned>(
    addr: SocketAddr,
    method: &str,
    req: &Req,
) -> Rsp {
    reqwest::Client::new()
        .post(format!("http://{addr}/{method}"))
        .json(req)
        .send()
        .await
        .expect("request sent")
        .json()
        .await
        .expect("response decoded")
}

#[tokio::test]
async fn register_login_avatar_roundtrip() {
    let addr = spawn_user_service().await;

    // S3: happy-path registration echoes the request id.
    let rsp: UserRegisterRsp = post(
        addr,
        "UserRegister",
        &UserRegisterReq {
            request_id: "r1".to_string(),
            nickname: "alice".to_string(),
            password: "Passw0rd".to_string(),
        },
    )
    .await;
    assert!(rsp.success, "{}", rsp.errmsg);
    assert_eq!(rsp.request_id, "r1");

    // Same nickname again: rejected.
    let rsp: UserRegisterRsp = post(
        addr,
        "UserRegister",
        &UserRegisterReq {
            request_id: "r2".to_string(),
            nickname: "alice".to_string(),
            password: "Passw0rd".to_string(),
        },
    )
    .await;
    assert!(!rsp.success);
    assert_eq!(rsp.errmsg, "昵称已存在");

    let login: UserLoginRsp = post(
        addr,
        "UserLogin",
        &UserLoginReq {
            request_id: "r3".to_string(),
            nickname: "alice".to_string(),
            password: "Passw0rd".to_string(),
        },
    )
    .await;
    assert!(login.success);

    // A second concurrent login for the same user is rejected.
    let probe: UserLoginRsp = post(
        addr,
        "UserLogin",
        &UserLoginReq {
            request_id: "r4".to_string(),
            nickname: "alice".to_string(),
            password: "Passw0rd".to_string(),
        },
    )
    .await;
    assert!(!probe.success);
    assert_eq!(probe.errmsg, "用户已在其它地方登录");
}

#[tokio::test]
async fn avatar_flows_through_the_file_service() {
    let addr = spawn_user_service().await;

    let rsp: UserRegisterRsp = post(
        addr,
        "UserRegister",
        &UserRegisterReq {
            request_id: "r1".to_string(),
            nickname: "bob".to_string(),
            password: "Passw0rd".to_string(),
        },
    )
    .await;
    assert!(rsp.success);

    let login: UserLoginRsp = post(
        addr,
        "UserLogin",
        &UserLoginReq {
            request_id: "r2".to_string(),
            nickname: "bob".to_string(),
            password: "Passw0rd".to_string(),
        },
    )
    .await;
    assert!(login.success);

    // Registration does not return the user id; look it up by nickname.
    let search: UserSearchRsp = post(
        addr,
        "UserSearch",
        &UserSearchReq {
            request_id: "r3".to_string(),
            search_key: "bob".to_string(),
            exclude_users_id: Vec::new(),
        },
    )
    .await;
    assert!(search.success);
    let bob_id = search.users_info[0].user_id.clone();

    // A write under someone else's session is rejected...
    let rsp: SetUserAvatarRsp = post(
        addr,
        "SetUserAvatar",
        &SetUserAvatarReq {
            request_id: "r4".to_string(),
            user_id: bob_id.clone(),
            session_id: "stolen".to_string(),
            avatar: vec![0xca, 0xfe],
        },
    )
    .await;
    assert!(!rsp.success);
    assert_eq!(rsp.errmsg, "会话无效");

    // ...while the owning session stores the avatar in the file service.
    let rsp: SetUserAvatarRsp = post(
        addr,
        "SetUserAvatar",
        &SetUserAvatarReq {
            request_id: "r5".to_string(),
            user_id: bob_id.clone(),
            session_id: login.login_session_id.clone(),
            avatar: vec![0xca, 0xfe],
        },
    )
    .await;
    assert!(rsp.success, "{}", rsp.errmsg);

    let info: GetUserInfoRsp = post(
        addr,
        "GetUserInfo",
        &GetUserInfoReq {
            request_id: "r6".to_string(),
            user_id: bob_id,
        },
    )
    .await;
    assert!(info.success);
    assert_eq!(info.user_info.unwrap().avatar, vec![0xca, 0xfe]);
}
