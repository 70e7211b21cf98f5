use gethostname::gethostname;
use uuid::Uuid;

/// Builds a message-id for an outgoing message with the domain segment
/// replaced by the operator-configured server host name, so internal
/// app-server host names never reach external recipients in a multi-host
/// deployment.
pub fn generate_message_id(server_host_name: &str) -> String {
    rewrite_message_id(&fresh_message_id(), server_host_name)
}

/// Replaces everything after the `@` of a generated message-id with the
/// configured server host name. The local part is kept verbatim, including
/// its leading `<`.
fn rewrite_message_id(raw: &str, server_host_name: &str) -> String {
    let local_part = raw.split('@').next().unwrap_or(raw);
    format!("{}@{}>", local_part, server_host_name)
}

/// Globally-unique raw message-id in the usual `<time.pid.unique@host>` shape.
fn fresh_message_id() -> String {
    format!(
        "<{}.{}.{}@{}>",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        std::process::id(),
        Uuid::new_v4().simple(),
        gethostname().to_string_lossy(),
    )
}
