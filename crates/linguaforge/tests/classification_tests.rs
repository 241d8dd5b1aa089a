//! Converter output classification against representative diagnostics.

use linguaforge::conversion::{classify, ConversionOutcome, FailureKind};

fn lines(text: &[&str]) -> Vec<String> {
    text.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_known_signatures_on_stderr() {
    let cases: &[(&str, FailureKind)] = &[
        ("Missing -srcLang parameter", FailureKind::MissingArgument),
        ("Catalog file /opt/catalog.xml not found", FailureKind::CatalogNotFound),
        ("java.io.FileNotFoundException: /tmp/in.docx", FailureKind::MissingSourceFile),
        ("/out/de-DE/a.xlf: Permission denied", FailureKind::PermissionDenied),
        (
            "org.xml.sax.SAXParseException: Content is not allowed in prolog.",
            FailureKind::MalformedXml,
        ),
        (
            "Error: Could not find or load main class Convert",
            FailureKind::MissingResources,
        ),
        ("sh: java: not found", FailureKind::MissingResources),
    ];

    for (line, expected) in cases {
        let outcome = classify(Some(1), &[], &lines(&[line]));
        assert_eq!(
            outcome,
            ConversionOutcome::KnownFailure {
                kind: *expected,
                message: line.to_string(),
            },
            "line: {line}"
        );
    }
}

#[test]
fn test_first_matching_signature_wins() {
    // Mentions both a catalog and a missing file; the catalog check runs first.
    let stderr = lines(&["catalog /etc/xml/catalog.xml does not exist: no such file or directory"]);
    let outcome = classify(Some(1), &[], &stderr);
    assert!(matches!(
        outcome,
        ConversionOutcome::KnownFailure { kind: FailureKind::CatalogNotFound, .. }
    ));
}

#[test]
fn test_known_signature_on_stdout_only_counts_on_failure() {
    let stdout = lines(&["Missing -tgtLang parameter"]);

    let failed = classify(Some(3), &stdout, &[]);
    assert!(matches!(
        failed,
        ConversionOutcome::KnownFailure { kind: FailureKind::MissingArgument, .. }
    ));

    assert_eq!(classify(Some(0), &stdout, &[]), ConversionOutcome::Success);
}

#[test]
fn test_unrecognized_failures_are_unknown() {
    let outcome = classify(
        Some(2),
        &lines(&["Converting..."]),
        &lines(&["", "Exception in thread \"main\" java.lang.NullPointerException"]),
    );
    assert_eq!(
        outcome,
        ConversionOutcome::UnknownFailure {
            message: "Exception in thread \"main\" java.lang.NullPointerException".to_string(),
        }
    );

    let silent = classify(Some(7), &[], &[]);
    assert_eq!(
        silent,
        ConversionOutcome::UnknownFailure {
            message: "converter exited with status 7".to_string(),
        }
    );

    let killed = classify(None, &[], &[]);
    assert!(matches!(killed, ConversionOutcome::UnknownFailure { .. }));
}

#[test]
fn test_error_token_on_clean_exit_is_unknown() {
    let outcome = classify(Some(0), &[], &lines(&["SEVERE ERROR while writing skeleton"]));
    assert!(matches!(outcome, ConversionOutcome::UnknownFailure { .. }));
}

#[test]
fn test_clean_exit_with_warnings_is_success() {
    let outcome = classify(
        Some(0),
        &lines(&["Converting to /out/a.xlf", "Done"]),
        &lines(&["WARNING: segment 12 has no translatable text"]),
    );
    assert_eq!(outcome, ConversionOutcome::Success);
}

#[test]
fn test_error_log_format() {
    let known = ConversionOutcome::KnownFailure {
        kind: FailureKind::MissingArgument,
        message: "Missing -srcLang parameter".to_string(),
    };
    assert_eq!(
        known.error_log().as_deref(),
        Some("missing_argument: Missing -srcLang parameter")
    );
    assert_eq!(ConversionOutcome::Success.error_log(), None);
    assert_eq!(ConversionOutcome::Cancelled.error_log().as_deref(), Some("cancelled"));
}
