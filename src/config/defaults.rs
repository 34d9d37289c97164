//! Default values for optional config fields.

pub fn default_coord_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}

pub fn default_lease_ttl() -> i64 {
    10
}

pub fn default_worker_threads() -> usize {
    4
}

pub fn default_rpc_timeout_ms() -> u64 {
    0
}

pub fn default_rpc_max_retry() -> u32 {
    3
}

pub fn default_routing_key() -> String {
    String::new()
}

pub fn default_user_service() -> String {
    "user".to_string()
}

pub fn default_file_service() -> String {
    "file".to_string()
}

pub fn default_db_pool_size() -> u32 {
    10
}

pub fn default_asr_tmp_dir() -> String {
    "tmp".to_string()
}

pub fn default_email_content_type() -> String {
    "html".to_string()
}
