use crate::config::{ImageKind, ProfileConfig};
use crate::errors::ValidationError;
use crate::pipeline::{AcceptedFile, RawFile};

/// Validates a whole batch before any file is processed or written.
///
/// Checks run cheapest-first: batch shape, then declared type, then
/// byte size. The first violation fails the whole batch with an error
/// naming the specific constraint, so no partial state ever exists at
/// rejection time.
pub fn accept(
    files: Vec<RawFile>,
    cfg: &ProfileConfig,
) -> Result<Vec<AcceptedFile>, ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    if files.len() > cfg.max_files {
        return Err(ValidationError::TooManyFiles {
            got: files.len(),
            limit: cfg.max_files,
        });
    }

    let mut accepted = Vec::with_capacity(files.len());
    for file in files {
        let kind = match ImageKind::from_content_type(&file.content_type) {
            Some(kind) if cfg.allowed_types.contains(&kind) => kind,
            _ => {
                return Err(ValidationError::UnsupportedType {
                    name: file.name,
                    mime: file.content_type,
                })
            }
        };

        if file.data.is_empty() {
            return Err(ValidationError::EmptyFile { name: file.name });
        }

        if file.data.len() > cfg.max_file_size {
            return Err(ValidationError::FileTooLarge {
                name: file.name,
                size: file.data.len(),
                limit: cfg.max_file_size,
            });
        }

        accepted.push(AcceptedFile {
            name: file.name,
            kind,
            data: file.data,
        });
    }

    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn profile() -> ProfileConfig {
        let cfg = crate::config::RuntimeConfig::from_yaml(
            r#"
backend:
  filesystem:
    directory: /tmp/atrium-data
profiles:
  test:
    max_file_size: 1024
    max_files: 3
    allowed_types: [jpeg, png]
"#,
        )
        .expect("config should parse");
        cfg.profiles["test"].clone()
    }

    fn raw(name: &str, content_type: &str, len: usize) -> RawFile {
        RawFile {
            name: name.to_string(),
            content_type: content_type.to_string(),
            data: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn test_accepts_valid_batch() {
        let accepted = accept(
            vec![raw("a.jpg", "image/jpeg", 100), raw("b.png", "image/png", 200)],
            &profile(),
        )
        .expect("batch should be accepted");

        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].kind, ImageKind::Jpeg);
        assert_eq!(accepted[1].kind, ImageKind::Png);
    }

    #[test]
    fn test_rejects_empty_batch() {
        let err = accept(vec![], &profile()).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyBatch));
    }

    #[test]
    fn test_rejects_overcount_before_inspecting_files() {
        let files = (0..4).map(|i| raw(&format!("{}.jpg", i), "image/jpeg", 10));
        let err = accept(files.collect(), &profile()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TooManyFiles { got: 4, limit: 3 },
        ));
    }

    #[test]
    fn test_rejects_disallowed_mime_type() {
        let err = accept(
            vec![raw("doc.pdf", "application/pdf", 100)],
            &profile(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));

        // gif is a valid image kind but not in this profile's allow-list.
        let err = accept(vec![raw("a.gif", "image/gif", 100)], &profile()).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
    }

    #[test]
    fn test_rejects_oversize_file() {
        let err = accept(vec![raw("big.jpg", "image/jpeg", 2048)], &profile()).unwrap_err();
        match err {
            ValidationError::FileTooLarge { size, limit, .. } => {
                assert_eq!(size, 2048);
                assert_eq!(limit, 1024);
            }
            other => panic!("expected FileTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_file() {
        let err = accept(vec![raw("empty.jpg", "image/jpeg", 0)], &profile()).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyFile { .. }));
    }

    #[test]
    fn test_one_bad_file_rejects_the_whole_batch() {
        let err = accept(
            vec![
                raw("ok.jpg", "image/jpeg", 100),
                raw("nope.bmp", "image/bmp", 100),
            ],
            &profile(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
    }
}
