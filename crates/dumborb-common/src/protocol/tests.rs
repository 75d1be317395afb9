#[cfg(test)]
mod tests {
    use crate::protocol::*;
    use std::fmt;

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("disk full")
        }
    }

    impl std::error::Error for Inner {}

    #[derive(Debug)]
    struct Outer(Inner);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("could not save")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_app_error_message() {
        let err = AppError::new("boom");
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_app_error_trace_includes_cause_chain() {
        let err = AppError::from_error(Outer(Inner));
        assert_eq!(err.message(), "could not save");
        let trace = err.trace();
        assert!(trace.starts_with("could not save"));
        assert!(trace.contains("Caused by: disk full"));
    }

    #[test]
    fn test_app_error_from_dumborb_error() {
        let err: AppError = DumborbError::NoSuchObject(9).into();
        assert!(err.message().contains('9'));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_codes_per_variant() {
        assert_eq!(DumborbError::Parse("x".into()).code(), 590);
        assert_eq!(DumborbError::NoSuchMethod("x".into()).code(), 591);
        assert_eq!(DumborbError::NoSuchObject(1).code(), 591);
        assert_eq!(DumborbError::Unmarshal("x".into()).code(), 592);
        assert_eq!(DumborbError::Marshal("x".into()).code(), 593);
        assert_eq!(DumborbError::NoSuchConstructor("x".into()).code(), 594);
        assert_eq!(DumborbError::Fixup("x".into()).code(), 594);
    }

    #[test]
    fn test_request_roundtrip_through_serde() {
        let fixups = vec![Fixup::new(vec![0.into(), "next".into()], vec![0.into()])];
        let req = Request::new("list.append", vec![serde_json::json!({"next": null})])
            .with_id(serde_json::json!(3))
            .with_fixups(&fixups);
        let text = serde_json::to_string(&req).unwrap();
        let parsed = Request::parse(&serde_json::from_str(&text).unwrap()).unwrap();
        assert_eq!(parsed.fixups().unwrap(), fixups);
        assert_eq!(parsed.id, serde_json::json!(3));
    }
}
