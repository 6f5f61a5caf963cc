use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadError {
    #[error("File size exceeds maximum allowed size of {0}MB")]
    TooLarge(i32),
    #[error("Could not determine file type")]
    UnknownType,
    #[error("File type {mime} is not accepted. Accepted types: {accepted}")]
    TypeNotAccepted { mime: String, accepted: String },
    #[error("File name is missing")]
    MissingFileName,
}

/// Checks size and MIME type of an upload, returning the guessed MIME type.
///
/// An empty `accepted` list accepts any type. Patterns may end in `/*`.
pub fn validate_upload(
    file_name: &str,
    size_bytes: usize,
    max_size_mb: i32,
    accepted: &[String],
) -> Result<String, UploadError> {
    if file_name.trim().is_empty() {
        return Err(UploadError::MissingFileName);
    }

    let max_bytes = i64::from(max_size_mb.max(0)) * 1024 * 1024;
    if size_bytes as i64 > max_bytes {
        return Err(UploadError::TooLarge(max_size_mb));
    }

    let mime = mime_guess::from_path(file_name)
        .first()
        .ok_or(UploadError::UnknownType)?
        .essence_str()
        .to_string();

    if !accepted.is_empty() && !accepted.iter().any(|pattern| mime_matches(&mime, pattern)) {
        return Err(UploadError::TypeNotAccepted {
            mime,
            accepted: accepted.join(", "),
        });
    }

    Ok(mime)
}

pub fn mime_matches(mime: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    match pattern.strip_suffix("/*") {
        Some(prefix) => mime
            .split_once('/')
            .is_some_and(|(kind, _)| kind.eq_ignore_ascii_case(prefix)),
        None => mime.eq_ignore_ascii_case(pattern),
    }
}

/// Keeps alphanumerics and `._- `, drops everything else.
pub fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let safe: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect();
    let safe = safe.trim().trim_start_matches('.').to_string();
    if safe.is_empty() {
        String::from("file")
    } else {
        safe
    }
}

/// `pathways/{pathway}/users/{user}/resources/{resource}/{timestamp}_{safe name}`
pub fn object_path(
    pathway_id: &str,
    user_id: Uuid,
    resource_id: &str,
    file_name: &str,
    now: DateTime<Utc>,
) -> String {
    format!(
        "pathways/{}/users/{}/resources/{}/{}_{}",
        pathway_id,
        user_id,
        resource_id,
        now.format("%Y-%m-%d_%H-%M-%S"),
        safe_file_name(file_name)
    )
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn types(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_matching_type() {
        let mime = validate_upload("report.pdf", 1024, 10, &types(&["application/pdf"])).unwrap();
        assert_eq!(mime, "application/pdf");
    }

    #[test]
    fn wildcard_patterns() {
        assert_eq!(
            validate_upload("photo.PNG", 10, 1, &types(&["image/*"])).unwrap(),
            "image/png"
        );
        assert!(mime_matches("image/jpeg", "image/*"));
        assert!(!mime_matches("application/pdf", "image/*"));
    }

    #[test]
    fn empty_accept_list_allows_anything_known() {
        assert!(validate_upload("notes.txt", 10, 1, &[]).is_ok());
    }

    #[test]
    fn size_limit_is_inclusive() {
        let limit = 2 * 1024 * 1024;
        assert!(validate_upload("a.pdf", limit, 2, &[]).is_ok());
        assert_eq!(
            validate_upload("a.pdf", limit + 1, 2, &[]),
            Err(UploadError::TooLarge(2))
        );
    }

    #[test]
    fn rejects_unknown_and_unaccepted_types() {
        assert_eq!(
            validate_upload("blob", 10, 1, &[]),
            Err(UploadError::UnknownType)
        );
        assert!(matches!(
            validate_upload("a.zip", 10, 1, &types(&["application/pdf", "image/*"])),
            Err(UploadError::TypeNotAccepted { .. })
        ));
    }

    #[test]
    fn safe_names() {
        assert_eq!(safe_file_name("my report (v2).pdf"), "my report v2.pdf");
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("..."), "file");
    }

    #[test]
    fn path_layout() {
        let user = Uuid::nil();
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 9, 3, 7).unwrap();
        assert_eq!(
            object_path("ai-eng", user, "ai-eng-m1-r2", "my file.pdf", now),
            format!(
                "pathways/ai-eng/users/{}/resources/ai-eng-m1-r2/2024-05-17_09-03-07_my file.pdf",
                user
            )
        );
    }
}
