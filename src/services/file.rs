//! File core: content-addressed blob storage on a shared directory.
//!
//! Every put allocates a fresh 16-hex id and writes the whole file under
//! `<root>/<file_id>`; re-writes by the same id are idempotent overwrites.

use crate::metrics;
use crate::rpc::{
    FileDownloadData, FileInfo, GetMultiFileReq, GetMultiFileRsp, GetSingleFileReq,
    GetSingleFileRsp, PutMultiFileReq, PutMultiFileRsp, PutSingleFileReq, PutSingleFileRsp,
};
use crate::util::uuid16;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;

pub struct FileService {
    root: PathBuf,
}

/// Blob ids are generated 16-hex strings; anything else (and in particular
/// anything with a path separator) is rejected before touching the
/// filesystem.
fn valid_file_id(file_id: &str) -> bool {
    !file_id.is_empty() && file_id.chars().all(|c| c.is_ascii_hexdigit())
}

impl FileService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, file_id: &str) -> PathBuf {
        self.root.join(file_id)
    }

    async fn read_blob(&self, file_id: &str) -> Option<Vec<u8>> {
        if !valid_file_id(file_id) {
            error!(file_id, "rejecting malformed file id");
            return None;
        }
        match tokio::fs::read(self.blob_path(file_id)).await {
            Ok(content) => Some(content),
            Err(e) => {
                error!(file_id, error = %e, "blob read failed");
                None
            }
        }
    }

    async fn write_blob(&self, file_id: &str, content: &[u8]) -> bool {
        let path = self.blob_path(file_id);
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            error!(path = %parent.display(), error = %e, "blob directory create failed");
            return false;
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => true,
            Err(e) => {
                error!(file_id, error = %e, "blob write failed");
                false
            }
        }
    }

    pub async fn get_single(&self, req: GetSingleFileReq) -> GetSingleFileRsp {
        match self.read_blob(&req.file_id).await {
            Some(content) => GetSingleFileRsp {
                request_id: req.request_id,
                success: true,
                file_data: Some(FileDownloadData {
                    file_id: req.file_id,
                    content,
                }),
                ..Default::default()
            },
            None => GetSingleFileRsp {
                request_id: req.request_id,
                success: false,
                errmsg: "读取文件数据失败".to_string(),
                file_data: None,
            },
        }
    }

    /// Batched read; one miss fails the whole call and clears the result.
    pub async fn get_multi(&self, req: GetMultiFileReq) -> GetMultiFileRsp {
        let mut file_data = HashMap::new();
        for file_id in &req.file_id_list {
            match self.read_blob(file_id).await {
                Some(content) => {
                    file_data.insert(
                        file_id.clone(),
                        FileDownloadData {
                            file_id: file_id.clone(),
                            content,
                        },
                    );
                }
                None => {
                    return GetMultiFileRsp {
                        request_id: req.request_id,
                        success: false,
                        errmsg: "读取文件数据失败".to_string(),
                        file_data: HashMap::new(),
                    };
                }
            }
        }
        GetMultiFileRsp {
            request_id: req.request_id,
            success: true,
            file_data,
            ..Default::default()
        }
    }

    pub async fn put_single(&self, req: PutSingleFileReq) -> PutSingleFileRsp {
        let file_id = uuid16();
        if self.write_blob(&file_id, &req.file_data.content).await {
            PutSingleFileRsp {
                request_id: req.request_id,
                success: true,
                file_info: Some(FileInfo {
                    file_id,
                    file_name: req.file_data.file_name,
                    file_size: req.file_data.file_size,
                }),
                ..Default::default()
            }
        } else {
            PutSingleFileRsp {
                request_id: req.request_id,
                success: false,
                errmsg: "写入文件数据失败".to_string(),
                file_info: None,
            }
        }
    }

    /// Sequential batched write; one failure fails the whole call and drops
    /// the partial id list.
    pub async fn put_multi(&self, req: PutMultiFileReq) -> PutMultiFileRsp {
        let mut file_info = Vec::with_capacity(req.file_data.len());
        for upload in &req.file_data {
            let file_id = uuid16();
            if self.write_blob(&file_id, &upload.content).await {
                file_info.push(FileInfo {
                    file_id,
                    file_name: upload.file_name.clone(),
                    file_size: upload.file_size,
                });
            } else {
                return PutMultiFileRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: "写入文件数据失败".to_string(),
                    file_info: Vec::new(),
                };
            }
        }
        PutMultiFileRsp {
            request_id: req.request_id,
            success: true,
            file_info,
            ..Default::default()
        }
    }

    /// The RPC surface of the file service.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/GetSingleFile", post(get_single))
            .route("/GetMultiFile", post(get_multi))
            .route("/PutSingleFile", post(put_single))
            .route("/PutMultiFile", post(put_multi))
            .with_state(self)
    }
}

async fn get_single(
    State(svc): State<Arc<FileService>>,
    Json(req): Json<GetSingleFileReq>,
) -> Json<GetSingleFileRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.get_single(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

async fn get_multi(
    State(svc): State<Arc<FileService>>,
    Json(req): Json<GetMultiFileReq>,
) -> Json<GetMultiFileRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.get_multi(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

async fn put_single(
    State(svc): State<Arc<FileService>>,
    Json(req): Json<PutSingleFileReq>,
) -> Json<PutSingleFileRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.put_single(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

async fn put_multi(
    State(svc): State<Arc<FileService>>,
    Json(req): Json<PutMultiFileReq>,
) -> Json<PutMultiFileRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.put_multi(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::FileUploadData;

    fn service() -> (tempfile::TempDir, FileService) {
        let dir = tempfile::tempdir().unwrap();
        let svc = FileService::new(dir.path());
        (dir, svc)
    }

    fn upload(name: &str, content: &[u8]) -> FileUploadData {
        FileUploadData {
            file_name: name.to_string(),
            content: content.to_vec(),
            file_size: content.len() as u64,
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let (_dir, svc) = service();

        let put = svc
            .put_single(PutSingleFileReq {
                request_id: "r1".to_string(),
                file_data: upload("a.txt", b"hello"),
            })
            .await;
        assert!(put.success);
        assert_eq!(put.request_id, "r1");
        let info = put.file_info.unwrap();
        assert_eq!(info.file_id.len(), 16);

        let get = svc
            .get_single(GetSingleFileReq {
                request_id: "r2".to_string(),
                file_id: info.file_id.clone(),
            })
            .await;
        assert!(get.success);
        assert_eq!(get.file_data.unwrap().content, b"hello");
    }

    #[tokio::test]
    async fn get_of_unknown_id_fails() {
        let (_dir, svc) = service();
        let get = svc
            .get_single(GetSingleFileReq {
                request_id: "r1".to_string(),
                file_id: "00000000000000aa".to_string(),
            })
            .await;
        assert!(!get.success);
        assert_eq!(get.errmsg, "读取文件数据失败");
    }

    #[tokio::test]
    async fn traversal_shaped_id_is_rejected() {
        let (_dir, svc) = service();
        let get = svc
            .get_single(GetSingleFileReq {
                request_id: "r1".to_string(),
                file_id: "../etc/passwd".to_string(),
            })
            .await;
        assert!(!get.success);
    }

    #[tokio::test]
    async fn multi_get_fails_whole_call_on_any_miss() {
        let (_dir, svc) = service();
        let put = svc
            .put_single(PutSingleFileReq {
                request_id: "r1".to_string(),
                file_data: upload("a", b"x"),
            })
            .await;
        let good_id = put.file_info.unwrap().file_id;

        let rsp = svc
            .get_multi(GetMultiFileReq {
                request_id: "r2".to_string(),
                file_id_list: vec![good_id.clone(), "00000000000000bb".to_string()],
            })
            .await;
        assert!(!rsp.success);
        assert!(rsp.file_data.is_empty());

        let rsp = svc
            .get_multi(GetMultiFileReq {
                request_id: "r3".to_string(),
                file_id_list: vec![good_id.clone()],
            })
            .await;
        assert!(rsp.success);
        assert_eq!(rsp.file_data[&good_id].content, b"x");
    }

    #[tokio::test]
    async fn put_multi_returns_one_id_per_upload() {
        let (_dir, svc) = service();
        let rsp = svc
            .put_multi(PutMultiFileReq {
                request_id: "r1".to_string(),
                file_data: vec![upload("a", b"1"), upload("b", b"2")],
            })
            .await;
        assert!(rsp.success);
        assert_eq!(rsp.file_info.len(), 2);
        assert_ne!(rsp.file_info[0].file_id, rsp.file_info[1].file_id);
    }
}
