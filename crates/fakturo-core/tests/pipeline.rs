//! End-to-end pipeline tests over scripted engines.

use fakturo_core::{
    CancelToken, Confidence, Document, EngineId, FakturoError, FieldKind, PipelineConfig,
    PipelineCoordinator, RecognitionEngine, ScriptedBehavior, ScriptedEngine, Token, ValidationStatus,
    VatRate,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

const INVOICE_LINES: &[&str] = &[
    "Faktura VAT nr FV/01/2024",
    "NIP: 5260001246",
    "15.03.2024",
    "23%",
    "100,00",
    "123,00",
];

fn png_document() -> Document {
    let img = image::DynamicImage::new_luma8(64, 64);
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    Document::from_bytes("doc-1", buf.into_inner())
}

fn coordinator(engines: Vec<Box<dyn RecognitionEngine>>) -> PipelineCoordinator {
    PipelineCoordinator::new(PipelineConfig::default(), engines)
}

#[test]
fn test_clean_invoice_passes_without_review() {
    let engines: Vec<Box<dyn RecognitionEngine>> = vec![Box::new(ScriptedEngine::from_lines(
        EngineId::Primary,
        INVOICE_LINES,
        0.98,
    ))];
    let result = coordinator(engines)
        .submit(&png_document(), &CancelToken::new())
        .unwrap();

    let nip = result.field(FieldKind::Nip).unwrap();
    assert_eq!(nip.value.as_ref().unwrap().as_text(), Some("5260001246"));
    assert_eq!(nip.status, ValidationStatus::Valid);

    let number = result.field(FieldKind::InvoiceNumber).unwrap();
    assert_eq!(number.value.as_ref().unwrap().as_text(), Some("FV/01/2024"));

    let date = result.field(FieldKind::IssueDate).unwrap();
    assert_eq!(
        date.value.as_ref().unwrap().as_date(),
        chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
    );

    let rate = result.field(FieldKind::VatRate).unwrap();
    assert_eq!(
        rate.value.as_ref().unwrap().as_rate(),
        Some(VatRate::Standard23)
    );

    // The two bare amounts resolve by magnitude, VAT is derived.
    let gross = result.field(FieldKind::GrossAmount).unwrap();
    assert_eq!(
        gross.value.as_ref().unwrap().as_amount(),
        Some(Decimal::new(12300, 2))
    );
    let net = result.field(FieldKind::NetAmount).unwrap();
    assert_eq!(
        net.value.as_ref().unwrap().as_amount(),
        Some(Decimal::new(10000, 2))
    );
    let vat = result.field(FieldKind::VatAmount).unwrap();
    assert_eq!(
        vat.value.as_ref().unwrap().as_amount(),
        Some(Decimal::new(2300, 2))
    );

    assert!(result.overall_confidence.at_least(0.8));
    assert!(result.review_fields.is_empty(), "{:?}", result.review_fields);
    assert!(!result.needs_review);
    assert!(!result.degraded);
}

#[test]
fn test_fallback_result_is_marked_degraded() {
    let engines: Vec<Box<dyn RecognitionEngine>> = vec![
        Box::new(ScriptedEngine::new(
            EngineId::Primary,
            ScriptedBehavior::Fail("model crashed".into()),
        )),
        Box::new(ScriptedEngine::from_lines(
            EngineId::FallbackA,
            INVOICE_LINES,
            0.95,
        )),
    ];
    let result = coordinator(engines)
        .submit(&png_document(), &CancelToken::new())
        .unwrap();

    assert!(result.degraded);
    assert_eq!(
        result.field(FieldKind::Nip).unwrap().engine,
        Some(EngineId::FallbackA)
    );
    assert!(result.review_fields.is_empty());
}

#[test]
fn test_exhausted_engines_flag_required_fields() {
    let engines: Vec<Box<dyn RecognitionEngine>> = vec![
        Box::new(ScriptedEngine::new(
            EngineId::Primary,
            ScriptedBehavior::Fail("down".into()),
        )),
        Box::new(ScriptedEngine::new(
            EngineId::FallbackA,
            ScriptedBehavior::ResourceExceeded,
        )),
    ];
    let result = coordinator(engines)
        .submit(&png_document(), &CancelToken::new())
        .unwrap();

    assert_eq!(result.overall_confidence, Confidence::NONE);
    assert!(result.degraded);
    assert!(result.needs_review);
    for kind in [FieldKind::InvoiceNumber, FieldKind::Nip, FieldKind::GrossAmount] {
        assert!(result.review_fields.contains(&kind), "{}", kind);
    }
}

#[test]
fn test_partial_tokens_still_extracted_after_exhaustion() {
    let partial = vec![Token::new(
        "NIP: 5260001246",
        [0.0, 0.0, 120.0, 18.0],
        Confidence::new(0.5),
    )];
    let engines: Vec<Box<dyn RecognitionEngine>> = vec![Box::new(ScriptedEngine::new(
        EngineId::Primary,
        ScriptedBehavior::TimeoutWith(partial),
    ))];
    let result = coordinator(engines)
        .submit(&png_document(), &CancelToken::new())
        .unwrap();

    // The partial token yields a low-confidence NIP candidate; a
    // truncated run always lands in review.
    let nip = result.field(FieldKind::Nip).unwrap();
    assert_eq!(nip.value.as_ref().unwrap().as_text(), Some("5260001246"));
    assert!(nip.needs_review);
    assert!(result.degraded);
    assert!(result.review_fields.contains(&FieldKind::Nip));
}

#[test]
fn test_cancelled_document_produces_empty_result() {
    let engines: Vec<Box<dyn RecognitionEngine>> = vec![Box::new(ScriptedEngine::from_lines(
        EngineId::Primary,
        INVOICE_LINES,
        0.98,
    ))];
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = coordinator(engines)
        .submit(&png_document(), &cancel)
        .unwrap();
    assert_eq!(result.overall_confidence, Confidence::NONE);
    assert!(result.needs_review);
}

#[test]
fn test_undecodable_content_is_rejected() {
    let engines: Vec<Box<dyn RecognitionEngine>> = vec![Box::new(ScriptedEngine::from_lines(
        EngineId::Primary,
        INVOICE_LINES,
        0.98,
    ))];
    let junk = Document::from_bytes("doc-junk", b"not an image at all".to_vec());

    let err = coordinator(engines)
        .submit(&junk, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, FakturoError::UnsupportedFormat(_)));
}

#[test]
fn test_inconsistent_amounts_land_in_review() {
    let lines = &[
        "Faktura VAT nr FV/02/2024",
        "NIP: 5260001246",
        "Netto: 100,00",
        "Kwota VAT: 23,00",
        "Brutto: 150,00",
    ];
    let engines: Vec<Box<dyn RecognitionEngine>> = vec![Box::new(ScriptedEngine::from_lines(
        EngineId::Primary,
        lines,
        0.98,
    ))];
    let result = coordinator(engines)
        .submit(&png_document(), &CancelToken::new())
        .unwrap();

    for kind in [FieldKind::NetAmount, FieldKind::VatAmount, FieldKind::GrossAmount] {
        let field = result.field(kind).unwrap();
        assert_eq!(field.status, ValidationStatus::Invalid, "{}", kind);
        assert!(result.review_fields.contains(&kind), "{}", kind);
    }
    // Gross is required, so the failed cross-check caps the document.
    assert!(!result.overall_confidence.at_least(0.8));
    assert!(result.needs_review);
}
