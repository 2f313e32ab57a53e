use greentext_core::export::{ExportFormat, Exporter};
use greentext_core::state::{AppState, SessionPhase};
use greentext_core::{llm::LlmDriver, LlmProviderKind};

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn generate(runtime: &tokio::runtime::Runtime, state: &AppState, prompt: &str) {
    let request = state
        .llm()
        .request(LlmProviderKind::Mock, prompt, 1.0, 300);
    runtime.block_on(async {
        let (_, mut stream) = state
            .generate_streaming(request, None)
            .await
            .expect("open stream");
        while let Some(result) = stream.recv().await {
            if result.expect("chunk").done {
                break;
            }
        }
    });
}

#[test]
fn app_state_completes_mock_generation() {
    let runtime = test_runtime();
    let state = AppState::new(LlmDriver::fake(), Exporter::default());

    generate(&runtime, &state, "finds a mysterious USB drive");

    assert_eq!(state.phase(), SessionPhase::Complete);
    let post = state.render_post().expect("post");
    assert!(post.lines.first().is_some_and(|line| line == ">be me"));
    assert!(post
        .lines
        .iter()
        .any(|line| line == ">finds a mysterious usb drive"));
    assert!(post.lines.iter().all(|line| line.starts_with('>')));
}

#[test]
fn completed_post_survives_repeated_redisplay_and_export() {
    let runtime = test_runtime();
    let state = AppState::new(LlmDriver::fake(), Exporter::default());
    generate(&runtime, &state, "cats");

    let header = state.render_post().expect("post").header;
    for format in ExportFormat::ALL {
        let artifact = state.export(format).expect("export");
        assert_eq!(artifact.file_name(), format.file_name());
        assert!(!artifact.bytes.is_empty());
    }
    assert_eq!(state.render_post().expect("post").header, header);
    assert_eq!(state.phase(), SessionPhase::Complete);
}

#[test]
fn each_generation_gets_its_own_header() {
    let runtime = test_runtime();
    let state = AppState::new(LlmDriver::fake(), Exporter::default());
    generate(&runtime, &state, "first");
    let first = state.completed_session().expect("first");
    generate(&runtime, &state, "second");
    let second = state.completed_session().expect("second");

    assert_ne!(first.id, second.id);
    assert!(second.full_text.contains(">second\n"));
    assert!(!second.full_text.contains(">first\n"));
}
