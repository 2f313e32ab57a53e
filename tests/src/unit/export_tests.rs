use greentext_core::export::{canvas_height, Exporter, ExportFormat};

const INFO: &str = "Anonymous 03/09/24(Sat)14:05:07 No.123456789";

#[test]
fn text_export_is_passthrough() {
    let artifact = Exporter::default()
        .render(ExportFormat::Text, ">be me\n>fail\n", INFO)
        .expect("render");
    assert_eq!(artifact.bytes, b">be me\n>fail\n".to_vec());
    assert_eq!(artifact.mime(), "text/plain");
}

#[test]
fn image_height_tracks_non_blank_lines() {
    assert_eq!(canvas_height(3), canvas_height(0));
    assert_eq!(canvas_height(50), 1100);
    assert!(canvas_height(51) > canvas_height(50));
}

#[test]
fn binary_exports_carry_their_signatures() {
    let exporter = Exporter::default();
    let text = ">be me\n\n>render twice\n>mfw\n";

    let png = exporter
        .render(ExportFormat::Image, text, INFO)
        .expect("png");
    assert!(png.bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
    assert_eq!(png.file_name(), "greentext.png");

    let pdf = exporter.render(ExportFormat::Pdf, text, INFO).expect("pdf");
    assert!(pdf.bytes.starts_with(b"%PDF-"));
    assert_eq!(pdf.mime(), "application/pdf");
}
