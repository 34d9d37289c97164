//! User core: identity lifecycle, login sessions, verification codes and
//! profile writes.
//!
//! Profile writes follow a write-through pattern: the search index is
//! updated first, then the relational row; when the relational update
//! fails, the previous index state is restored, and a failed restore is
//! logged for operator follow-up. Mutating operations require the caller's
//! `(session_id, user_id)` pair to match the cached login session.

use crate::cache::{SessionStore, StatusStore, VerifyCodeStore};
use crate::db::{Database, UserRecord};
use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use crate::ports::{EmailPort, TextAudit, Verdict};
use crate::rpc::{
    BlobPort, EmailLoginReq, EmailLoginRsp, EmailRegisterReq, EmailRegisterRsp,
    EmailVerifyCodeReq, EmailVerifyCodeRsp, GetMultiUserInfoReq, GetMultiUserInfoRsp,
    GetUserInfoReq, GetUserInfoRsp, SetUserAvatarReq, SetUserAvatarRsp, SetUserDescriptionReq,
    SetUserDescriptionRsp, SetUserEmailReq, SetUserEmailRsp, SetUserNicknameReq,
    SetUserNicknameRsp, UserInfo, UserLoginReq, UserLoginRsp, UserRegisterReq, UserRegisterRsp,
    UserSearchReq, UserSearchRsp,
};
use crate::search::{UserDoc, UserIndexOps};
use crate::util::{hash_password, uuid16};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::error;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref NO_WHITESPACE_RE: Regex = Regex::new(r"^\S+$").unwrap();
}

pub struct UserService {
    db: Database,
    index: Arc<dyn UserIndexOps>,
    sessions: Arc<SessionStore>,
    status: Arc<StatusStore>,
    verify_codes: Arc<VerifyCodeStore>,
    email: Arc<dyn EmailPort>,
    audit: Arc<dyn TextAudit>,
    blobs: Arc<dyn BlobPort>,
}

/// Keep a fabric-level errmsg (no replica available) as-is; everything else
/// is replaced with the operation's own message, matching how callers see
/// these failures.
fn remap_blob_error(e: ServiceError, context: &str) -> ServiceError {
    if e.errmsg() == "获取file服务失败" {
        e
    } else {
        ServiceError::Dependency(context.to_string())
    }
}

impl UserService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        index: Arc<dyn UserIndexOps>,
        sessions: Arc<SessionStore>,
        status: Arc<StatusStore>,
        verify_codes: Arc<VerifyCodeStore>,
        email: Arc<dyn EmailPort>,
        audit: Arc<dyn TextAudit>,
        blobs: Arc<dyn BlobPort>,
    ) -> Self {
        Self {
            db,
            index,
            sessions,
            status,
            verify_codes,
            email,
            audit,
            blobs,
        }
    }

    // ------------------------------------------------------------------
    // Validation helpers
    // ------------------------------------------------------------------

    /// Length, moderation, uniqueness - in that order.
    async fn check_nickname(&self, nickname: &str) -> ServiceResult<()> {
        if nickname.is_empty() || nickname.chars().count() > 32 {
            return Err(ServiceError::Validation("昵称格式错误".to_string()));
        }
        match self.audit.classify(nickname).await {
            Ok(Verdict::Compliant) => {}
            Ok(Verdict::NonCompliant) => {
                return Err(ServiceError::Validation("昵称敏感".to_string()));
            }
            Err(e) => {
                // A classifier outage must not let unreviewed names through.
                error!(error = %e, "classifier request failed");
                return Err(ServiceError::Validation("昵称敏感".to_string()));
            }
        }
        match self.db.users().by_nickname(nickname).await {
            Ok(Some(_)) => Err(ServiceError::Conflict("昵称已存在".to_string())),
            Ok(None) => Ok(()),
            Err(e) => {
                error!(error = %e, "nickname lookup failed");
                Err(ServiceError::Dependency("注册失败".to_string()))
            }
        }
    }

    /// 8-32 chars, at least one letter and one digit, no whitespace.
    fn check_password(password: &str) -> ServiceResult<()> {
        if password.len() < 8 {
            return Err(ServiceError::Validation("密码过短".to_string()));
        }
        if password.len() > 32 {
            return Err(ServiceError::Validation("密码过长".to_string()));
        }
        let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if !has_letter || !has_digit || !NO_WHITESPACE_RE.is_match(password) {
            return Err(ServiceError::Validation(
                "密码格式错误, 至少一个字母和数字, 长度8-32, 允许字母、数字和特殊字符, 不允许空格"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn check_email(email: &str) -> ServiceResult<()> {
        if email.len() > 64 || !EMAIL_RE.is_match(email) {
            return Err(ServiceError::Validation("邮箱格式错误".to_string()));
        }
        Ok(())
    }

    /// A missing code id is an ordinary wrong-code rejection, never a crash.
    fn check_verify_code(&self, code_id: &str, code: &str) -> ServiceResult<()> {
        match self.verify_codes.code(code_id) {
            Some(stored) if stored == code => Ok(()),
            _ => Err(ServiceError::Validation("验证码错误".to_string())),
        }
    }

    /// Mutating operations must present the login session that owns the
    /// profile.
    fn check_session(&self, session_id: &str, user_id: &str) -> ServiceResult<()> {
        match self.sessions.user_id(session_id) {
            Some(owner) if owner == user_id => Ok(()),
            _ => Err(ServiceError::Validation("会话无效".to_string())),
        }
    }

    async fn load_user(&self, request_id: &str, user_id: &str) -> ServiceResult<UserRecord> {
        match self.db.users().by_user_id(user_id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                error!(request_id, user_id, "user lookup found nothing");
                Err(ServiceError::NotFound("用户不存在".to_string()))
            }
            Err(e) => {
                error!(request_id, user_id, error = %e, "user lookup failed");
                Err(ServiceError::Dependency("用户不存在".to_string()))
            }
        }
    }

    fn index_doc(user: &UserRecord) -> UserDoc {
        UserDoc {
            user_id: user.user_id.clone(),
            email: user.email().to_string(),
            nickname: user.nickname().to_string(),
            description: user.description().to_string(),
            avatar_id: user.avatar_id().to_string(),
        }
    }

    /// Index-first write-through with relational rollback compensation.
    async fn write_through(
        &self,
        request_id: &str,
        previous: &UserRecord,
        updated: &UserRecord,
        errmsg: &str,
    ) -> ServiceResult<()> {
        if let Err(e) = self.index.upsert(&Self::index_doc(updated)).await {
            error!(request_id, user_id = %updated.user_id, error = %e, "index update failed");
            return Err(ServiceError::Dependency(errmsg.to_string()));
        }
        if let Err(e) = self.db.users().update(updated).await {
            error!(request_id, user_id = %updated.user_id, error = %e, "relational update failed");
            if let Err(e) = self.index.upsert(&Self::index_doc(previous)).await {
                error!(
                    critical = true,
                    request_id,
                    user_id = %updated.user_id,
                    error = %e,
                    "index restore failed; stores are inconsistent"
                );
            }
            return Err(ServiceError::Consistency(errmsg.to_string()));
        }
        Ok(())
    }

    fn issue_session(&self, user_id: &str) -> String {
        let session_id = uuid16();
        self.sessions.append(&session_id, user_id);
        self.status.append(user_id);
        metrics::ONLINE_USERS.inc();
        session_id
    }

    // ------------------------------------------------------------------
    // Registration and login
    // ------------------------------------------------------------------

    async fn register_core(&self, request_id: &str, user: UserRecord) -> ServiceResult<()> {
        if let Err(e) = self.db.users().insert(&user).await {
            error!(request_id, user_id = %user.user_id, error = %e, "relational insert failed");
            return Err(ServiceError::Dependency("注册失败".to_string()));
        }
        if let Err(e) = self.index.upsert(&Self::index_doc(&user)).await {
            error!(request_id, user_id = %user.user_id, error = %e, "index insert failed");
            // Keep the stores aligned: the fresh relational row goes too.
            if let Err(e) = self.db.users().remove(&user.user_id).await {
                error!(
                    critical = true,
                    request_id,
                    user_id = %user.user_id,
                    error = %e,
                    "relational rollback failed; stores are inconsistent"
                );
            }
            return Err(ServiceError::Consistency("注册失败".to_string()));
        }
        Ok(())
    }

    pub async fn register(&self, req: UserRegisterReq) -> UserRegisterRsp {
        let outcome = async {
            self.check_nickname(&req.nickname).await?;
            Self::check_password(&req.password)?;
            let user = UserRecord::with_password(
                &uuid16(),
                &req.nickname,
                &hash_password(&req.password),
            );
            self.register_core(&req.request_id, user).await
        }
        .await;

        match outcome {
            Ok(()) => UserRegisterRsp {
                request_id: req.request_id,
                success: true,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                UserRegisterRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                }
            }
        }
    }

    async fn login_core(&self, user: &UserRecord) -> ServiceResult<String> {
        if self.status.exists(&user.user_id) {
            return Err(ServiceError::Conflict("用户已在其它地方登录".to_string()));
        }
        Ok(self.issue_session(&user.user_id))
    }

    pub async fn login(&self, req: UserLoginReq) -> UserLoginRsp {
        let outcome = async {
            let user = match self.db.users().by_nickname(&req.nickname).await {
                Ok(Some(user)) => user,
                Ok(None) => return Err(ServiceError::NotFound("用户不存在".to_string())),
                Err(e) => {
                    error!(request_id = %req.request_id, error = %e, "nickname lookup failed");
                    return Err(ServiceError::Dependency("用户不存在".to_string()));
                }
            };
            if user.password_hash.as_deref() != Some(hash_password(&req.password).as_str()) {
                return Err(ServiceError::Validation("密码错误".to_string()));
            }
            self.login_core(&user).await
        }
        .await;

        match outcome {
            Ok(login_session_id) => UserLoginRsp {
                request_id: req.request_id,
                success: true,
                login_session_id,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                UserLoginRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                    ..Default::default()
                }
            }
        }
    }

    pub async fn get_email_verify_code(&self, req: EmailVerifyCodeReq) -> EmailVerifyCodeRsp {
        let outcome = async {
            Self::check_email(&req.email)?;
            let code: u32 = rand::thread_rng().gen_range(0..=999_999);
            let code = format!("{code:06}");
            if let Err(e) = self.email.send_verify_code(&req.email, &code).await {
                error!(request_id = %req.request_id, email = %req.email, error = %e, "verification email failed");
                return Err(ServiceError::Dependency("邮件发送失败".to_string()));
            }
            let code_id = uuid16();
            self.verify_codes.append(&code_id, &code);
            Ok(code_id)
        }
        .await;

        match outcome {
            Ok(verify_code_id) => EmailVerifyCodeRsp {
                request_id: req.request_id,
                success: true,
                verify_code_id,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                EmailVerifyCodeRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                    ..Default::default()
                }
            }
        }
    }

    pub async fn email_register(&self, req: EmailRegisterReq) -> EmailRegisterRsp {
        let outcome = async {
            Self::check_email(&req.email)?;
            self.check_verify_code(&req.verify_code_id, &req.verify_code)?;
            match self.db.users().by_email(&req.email).await {
                Ok(Some(_)) => return Err(ServiceError::Conflict("邮箱已被注册".to_string())),
                Ok(None) => {}
                Err(e) => {
                    error!(request_id = %req.request_id, error = %e, "email lookup failed");
                    return Err(ServiceError::Dependency("注册失败".to_string()));
                }
            }
            let user = UserRecord::with_email(&uuid16(), &req.email);
            self.register_core(&req.request_id, user).await?;
            self.verify_codes.remove(&req.verify_code_id);
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => EmailRegisterRsp {
                request_id: req.request_id,
                success: true,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                EmailRegisterRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                }
            }
        }
    }

    pub async fn email_login(&self, req: EmailLoginReq) -> EmailLoginRsp {
        let outcome = async {
            Self::check_email(&req.email)?;
            let user = match self.db.users().by_email(&req.email).await {
                Ok(Some(user)) => user,
                Ok(None) => return Err(ServiceError::NotFound("用户不存在".to_string())),
                Err(e) => {
                    error!(request_id = %req.request_id, error = %e, "email lookup failed");
                    return Err(ServiceError::Dependency("用户不存在".to_string()));
                }
            };
            self.check_verify_code(&req.verify_code_id, &req.verify_code)?;
            self.verify_codes.remove(&req.verify_code_id);
            self.login_core(&user).await
        }
        .await;

        match outcome {
            Ok(login_session_id) => EmailLoginRsp {
                request_id: req.request_id,
                success: true,
                login_session_id,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                EmailLoginRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                    ..Default::default()
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Profile reads
    // ------------------------------------------------------------------

    pub async fn get_user_info(&self, req: GetUserInfoReq) -> GetUserInfoRsp {
        let outcome: Result<UserInfo, ServiceError> = async {
            let user = self.load_user(&req.request_id, &req.user_id).await?;
            let mut info = UserInfo {
                user_id: user.user_id.clone(),
                nickname: user.nickname().to_string(),
                description: user.description().to_string(),
                email: user.email().to_string(),
                avatar: Vec::new(),
            };
            if !user.avatar_id().is_empty() {
                info.avatar = self
                    .blobs
                    .get(&req.request_id, user.avatar_id())
                    .await
                    .map_err(|e| {
                        e.observe(&req.request_id);
                        remap_blob_error(e, "获取头像失败")
                    })?;
            }
            Ok(info)
        }
        .await;

        match outcome {
            Ok(user_info) => GetUserInfoRsp {
                request_id: req.request_id,
                success: true,
                user_info: Some(user_info),
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                GetUserInfoRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                    user_info: None,
                }
            }
        }
    }

    pub async fn get_multi_user_info(&self, req: GetMultiUserInfoReq) -> GetMultiUserInfoRsp {
        let outcome = async {
            // De-duplicate before the IN-query.
            let mut seen = HashSet::new();
            let mut unique_ids = Vec::new();
            for id in &req.users_id {
                if seen.insert(id.clone()) {
                    unique_ids.push(id.clone());
                }
            }

            let users = match self.db.users().by_user_ids(&unique_ids).await {
                Ok(users) => users,
                Err(e) => {
                    error!(request_id = %req.request_id, error = %e, "multi user lookup failed");
                    return Err(ServiceError::Dependency("用户不存在".to_string()));
                }
            };
            if users.len() != unique_ids.len() {
                error!(
                    request_id = %req.request_id,
                    requested = unique_ids.len(),
                    found = users.len(),
                    "multi user lookup incomplete"
                );
                return Err(ServiceError::NotFound("用户不存在".to_string()));
            }

            let mut infos: HashMap<String, UserInfo> = users
                .iter()
                .map(|user| {
                    (
                        user.user_id.clone(),
                        UserInfo {
                            user_id: user.user_id.clone(),
                            nickname: user.nickname().to_string(),
                            description: user.description().to_string(),
                            email: user.email().to_string(),
                            avatar: Vec::new(),
                        },
                    )
                })
                .collect();

            let avatar_ids: Vec<String> = users
                .iter()
                .filter(|u| !u.avatar_id().is_empty())
                .map(|u| u.avatar_id().to_string())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            if !avatar_ids.is_empty() {
                let avatars = self
                    .blobs
                    .get_multi(&req.request_id, &avatar_ids)
                    .await
                    .map_err(|e| {
                        e.observe(&req.request_id);
                        remap_blob_error(e, "获取头像失败")
                    })?;
                for user in &users {
                    if let Some(avatar) = avatars.get(user.avatar_id())
                        && let Some(info) = infos.get_mut(&user.user_id)
                    {
                        info.avatar = avatar.clone();
                    }
                }
            }
            Ok(infos)
        }
        .await;

        match outcome {
            Ok(users_info) => GetMultiUserInfoRsp {
                request_id: req.request_id,
                success: true,
                users_info,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                GetMultiUserInfoRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                    ..Default::default()
                }
            }
        }
    }

    pub async fn search(&self, req: UserSearchReq) -> UserSearchRsp {
        match self.index.search(&req.search_key, &req.exclude_users_id).await {
            Ok(docs) => UserSearchRsp {
                request_id: req.request_id,
                success: true,
                users_info: docs
                    .into_iter()
                    .map(|doc| UserInfo {
                        user_id: doc.user_id,
                        nickname: doc.nickname,
                        description: doc.description,
                        email: doc.email,
                        avatar: Vec::new(),
                    })
                    .collect(),
                ..Default::default()
            },
            Err(e) => {
                error!(request_id = %req.request_id, error = %e, "user search failed");
                UserSearchRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: "用户搜索失败".to_string(),
                    ..Default::default()
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Profile writes
    // ------------------------------------------------------------------

    pub async fn set_avatar(&self, req: SetUserAvatarReq) -> SetUserAvatarRsp {
        let outcome = async {
            self.check_session(&req.session_id, &req.user_id)?;
            let previous = self.load_user(&req.request_id, &req.user_id).await?;

            let file_name = format!("avatar_{}.jpg", req.user_id);
            let info = self
                .blobs
                .put(&req.request_id, &file_name, req.avatar.clone())
                .await
                .map_err(|e| {
                    e.observe(&req.request_id);
                    remap_blob_error(e, "头像上传失败")
                })?;

            let mut updated = previous.clone();
            updated.avatar_id = Some(info.file_id);
            self.write_through(&req.request_id, &previous, &updated, "头像更新失败")
                .await
        }
        .await;

        match outcome {
            Ok(()) => SetUserAvatarRsp {
                request_id: req.request_id,
                success: true,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                SetUserAvatarRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                }
            }
        }
    }

    pub async fn set_nickname(&self, req: SetUserNicknameReq) -> SetUserNicknameRsp {
        let outcome = async {
            self.check_session(&req.session_id, &req.user_id)?;
            self.check_nickname(&req.nickname).await?;
            let previous = self.load_user(&req.request_id, &req.user_id).await?;

            let mut updated = previous.clone();
            updated.nickname = Some(req.nickname.clone());
            self.write_through(&req.request_id, &previous, &updated, "昵称更新失败")
                .await
        }
        .await;

        match outcome {
            Ok(()) => SetUserNicknameRsp {
                request_id: req.request_id,
                success: true,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                SetUserNicknameRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                }
            }
        }
    }

    pub async fn set_description(&self, req: SetUserDescriptionReq) -> SetUserDescriptionRsp {
        let outcome = async {
            self.check_session(&req.session_id, &req.user_id)?;
            if req.description.chars().count() > 256 {
                return Err(ServiceError::Validation("签名过长".to_string()));
            }
            match self.audit.classify(&req.description).await {
                Ok(Verdict::Compliant) => {}
                Ok(Verdict::NonCompliant) => {
                    return Err(ServiceError::Validation("签名敏感".to_string()));
                }
                Err(e) => {
                    error!(error = %e, "classifier request failed");
                    return Err(ServiceError::Validation("签名敏感".to_string()));
                }
            }
            let previous = self.load_user(&req.request_id, &req.user_id).await?;

            let mut updated = previous.clone();
            updated.description = Some(req.description.clone());
            self.write_through(&req.request_id, &previous, &updated, "签名更新失败")
                .await
        }
        .await;

        match outcome {
            Ok(()) => SetUserDescriptionRsp {
                request_id: req.request_id,
                success: true,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                SetUserDescriptionRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                }
            }
        }
    }

    pub async fn set_email(&self, req: SetUserEmailReq) -> SetUserEmailRsp {
        let outcome = async {
            self.check_session(&req.session_id, &req.user_id)?;
            Self::check_email(&req.email)?;
            self.check_verify_code(&req.email_verify_code_id, &req.email_verify_code)?;
            self.verify_codes.remove(&req.email_verify_code_id);
            let previous = self.load_user(&req.request_id, &req.user_id).await?;

            let mut updated = previous.clone();
            updated.email = Some(req.email.clone());
            self.write_through(&req.request_id, &previous, &updated, "邮箱更新失败")
                .await
        }
        .await;

        match outcome {
            Ok(()) => SetUserEmailRsp {
                request_id: req.request_id,
                success: true,
                ..Default::default()
            },
            Err(e) => {
                e.observe(&req.request_id);
                SetUserEmailRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.errmsg().to_string(),
                }
            }
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/UserRegister", post(register))
            .route("/UserLogin", post(login))
            .route("/GetEmailVerifyCode", post(get_email_verify_code))
            .route("/EmailRegister", post(email_register))
            .route("/EmailLogin", post(email_login))
            .route("/GetUserInfo", post(get_user_info))
            .route("/GetMultiUserInfo", post(get_multi_user_info))
            .route("/UserSearch", post(user_search))
            .route("/SetUserAvatar", post(set_avatar))
            .route("/SetUserNickname", post(set_nickname))
            .route("/SetUserDescription", post(set_description))
            .route("/SetUserEmail", post(set_email))
            .with_state(self)
    }
}

macro_rules! rpc_handler {
    ($name:ident, $req:ty, $rsp:ty, $method:ident) => {
        async fn $name(
            State(svc): State<Arc<UserService>>,
            Json(req): Json<$req>,
        ) -> Json<$rsp> {
            metrics::RPC_REQUESTS.inc();
            let rsp = svc.$method(req).await;
            if !rsp.success {
                metrics::RPC_FAILURES.inc();
            }
            Json(rsp)
        }
    };
}

rpc_handler!(register, UserRegisterReq, UserRegisterRsp, register);
rpc_handler!(login, UserLoginReq, UserLoginRsp, login);
rpc_handler!(
    get_email_verify_code,
    EmailVerifyCodeReq,
    EmailVerifyCodeRsp,
    get_email_verify_code
);
rpc_handler!(email_register, EmailRegisterReq, EmailRegisterRsp, email_register);
rpc_handler!(email_login, EmailLoginReq, EmailLoginRsp, email_login);
rpc_handler!(get_user_info, GetUserInfoReq, GetUserInfoRsp, get_user_info);
rpc_handler!(
    get_multi_user_info,
    GetMultiUserInfoReq,
    GetMultiUserInfoRsp,
    get_multi_user_info
);
rpc_handler!(user_search, UserSearchReq, UserSearchRsp, search);
rpc_handler!(set_avatar, SetUserAvatarReq, SetUserAvatarRsp, set_avatar);
rpc_handler!(set_nickname, SetUserNicknameReq, SetUserNicknameRsp, set_nickname);
rpc_handler!(
    set_description,
    SetUserDescriptionReq,
    SetUserDescriptionRsp,
    set_description
);
rpc_handler!(set_email, SetUserEmailReq, SetUserEmailRsp, set_email);
