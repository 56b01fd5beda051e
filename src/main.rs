use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use lens_translator::{
    EncodedImage, OcrService, OutputFormat, Outcome, Session, Size, StickerStates,
    SubmissionKey, TranslationService, Translator,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "lens-translator",
    version,
    about = "Translate the text in an image and lay it back over the image"
)]
struct Cli {
    /// Image to translate
    #[arg(required_unless_present = "server")]
    image: Option<String>,

    /// Target language (default: es)
    #[arg(short = 'l', long = "lang", default_value = "es")]
    lang: String,

    /// Google API key (overrides GOOGLE_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Print sticker layout for a WIDTHxHEIGHT viewport
    #[arg(long = "container", value_parser = lens_translator::parse_size)]
    container: Option<Size>,

    /// Render the overlay to a file (.svg, .png, .jpg, .webp)
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Render only the image, without stickers
    #[arg(long = "no-overlay")]
    no_overlay: bool,

    /// Output format: json or text
    #[arg(long = "format", default_value = "json")]
    format: OutputFormat,

    /// Serve the HTTP API on ADDR (e.g. 127.0.0.1:8787)
    #[arg(long = "server")]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Interactive mode
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    lens_translator::logging::init(cli.verbose)?;

    if let Some(addr) = cli.server.clone() {
        let settings =
            lens_translator::settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;
        let translator = lens_translator::build_translator(settings, cli.key.as_deref())?;
        return lens_translator::server::run_server(translator, addr).await;
    }
    if cli.interactive {
        return run_interactive(cli).await;
    }

    let image = cli
        .image
        .ok_or_else(|| anyhow!("an image path is required"))?;
    let output = lens_translator::run(lens_translator::Config {
        image,
        lang: cli.lang,
        key: cli.key,
        settings_path: cli.read_settings,
        container: cli.container,
        output: cli.output,
        format: cli.format,
        show_overlay: !cli.no_overlay,
    })
    .await?;

    println!("{}", output);
    Ok(())
}

struct InteractiveState<O, T> {
    translator: Arc<Translator<O, T>>,
    image: Arc<EncodedImage>,
    session: Session,
    lang: String,
    format: OutputFormat,
    container: Option<Size>,
    tasks: JoinSet<()>,
}

impl<O, T> InteractiveState<O, T>
where
    O: OcrService + 'static,
    T: TranslationService + 'static,
{
    fn new(translator: Translator<O, T>, image: EncodedImage, lang: String) -> Self {
        Self {
            translator: Arc::new(translator),
            image: Arc::new(image),
            session: Session::new(),
            lang,
            format: OutputFormat::default(),
            container: None,
            tasks: JoinSet::new(),
        }
    }

    /// Runs a translation in the background; a later submission makes it stale.
    fn submit(&mut self, lang: String) {
        while self.tasks.try_join_next().is_some() {}

        let key = SubmissionKey::new(self.image.key(), lang.clone());
        let translator = Arc::clone(&self.translator);
        let image = Arc::clone(&self.image);
        let work_lang = lang.clone();
        let submission = self.session.submit(key, async move {
            translator.exec(&image, &work_lang).await
        });

        let format = self.format;
        let container = self.container;
        let policy = self.translator.settings().overlay.clone();
        self.tasks.spawn(async move {
            match submission.await {
                Ok(Outcome::Applied(result)) => {
                    let states = StickerStates::new();
                    match lens_translator::format_output(
                        &result, format, container, &states, &policy,
                    ) {
                        Ok(output) => println!("\n[{}]\n{}", lang, output),
                        Err(err) => eprintln!("{}", err),
                    }
                }
                Ok(Outcome::Stale) => debug!("discarded stale {} result", lang),
                Err(err) => {
                    debug!("{}", err);
                    eprintln!("{}", err.user_message());
                }
            }
        });
    }

    /// Waits for every submission still in flight.
    async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                debug!("translation task ended early: {}", err);
            }
        }
    }
}

async fn run_interactive(cli: Cli) -> Result<()> {
    let path = cli
        .image
        .clone()
        .ok_or_else(|| anyhow!("an image path is required"))?;
    let settings =
        lens_translator::settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;
    lens_translator::validate_lang(&settings, &cli.lang)?;
    let image = lens_translator::load_image(&path, &settings)?;
    let translator = lens_translator::build_translator(settings, cli.key.as_deref())?;

    let mut state = InteractiveState::new(translator, image, cli.lang.clone());
    state.format = cli.format;
    state.container = cli.container;
    println!("Interactive mode for {}. Use /quit or /exit to finish.", path);
    println!("Type a language code to translate, or /help for commands.");
    state.submit(state.lang.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let quit = loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break false;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.starts_with('/') {
            if handle_interactive_command(input, &mut state) {
                break true;
            }
            continue;
        }
        if let Err(err) = lens_translator::validate_lang(state.translator.settings(), input) {
            eprintln!("{}", err);
            continue;
        }
        state.lang = input.to_string();
        state.submit(state.lang.clone());
    };

    if quit {
        state.tasks.abort_all();
    }
    state.drain().await;
    Ok(())
}

/// Returns true when the session should end. Bad arguments are reported and
/// the session carries on.
fn handle_interactive_command<O, T>(input: &str, state: &mut InteractiveState<O, T>) -> bool
where
    O: OcrService + 'static,
    T: TranslationService + 'static,
{
    match run_command(input, state) {
        Ok(quit) => quit,
        Err(err) => {
            eprintln!("{}", err);
            false
        }
    }
}

fn run_command<O, T>(input: &str, state: &mut InteractiveState<O, T>) -> Result<bool>
where
    O: OcrService + 'static,
    T: TranslationService + 'static,
{
    let trimmed = input.trim();
    if matches!(trimmed, "/quit" | "/exit") {
        return Ok(true);
    }
    if trimmed == "/help" {
        print_interactive_help();
        return Ok(false);
    }
    if trimmed == "/show" {
        match state.session.current() {
            Some(result) => println!(
                "{}",
                lens_translator::format_output(
                    &result,
                    state.format,
                    state.container,
                    &state.session.stickers(),
                    &state.translator.settings().overlay
                )?
            ),
            None => println!("no result yet"),
        }
        return Ok(false);
    }
    if trimmed == "/languages" {
        println!("{}", state.translator.settings().languages.join(", "));
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/toggle") {
        let index: usize = arg
            .trim()
            .parse()
            .map_err(|_| anyhow!("expected a block index"))?;
        let blocks = state
            .session
            .current()
            .map(|result| result.blocks.len())
            .unwrap_or(0);
        if index >= blocks {
            return Err(anyhow!(
                "no block {} (current result has {} blocks)",
                index,
                blocks
            ));
        }
        let sticker = state.session.toggle_sticker(index);
        println!("block {}: {:?}", index, sticker);
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/container") {
        let value = arg.trim();
        if value.is_empty() {
            state.container = None;
            println!("container cleared");
        } else {
            let size = lens_translator::parse_size(value)?;
            state.container = Some(size);
            println!("container set to {}x{}", size.width, size.height);
        }
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/format") {
        state.format = arg.trim().parse()?;
        println!("format set to {:?}", state.format);
        return Ok(false);
    }

    eprintln!("unknown command: {}", trimmed);
    Ok(false)
}

fn print_interactive_help() {
    println!("Commands:");
    println!("  <lang>                  Translate into <lang>; newer requests win");
    println!("  /show                   Print the current result");
    println!("  /languages              Show enabled target languages");
    println!("  /toggle <index>         Expand or clip one sticker");
    println!("  /container <WxH>        Set the layout viewport (empty clears)");
    println!("  /format <json|text>     Set the output format");
    println!("  /quit, /exit            Exit interactive mode");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_translator::Settings;
    use lens_translator::ocr::{DetectionMode, TextAnnotation};
    use lens_translator::overlay::StickerState;
    use lens_translator::providers::{OcrFuture, TranslateFuture, TranslationItem};
    use std::time::Duration;

    struct SignOcr;

    impl OcrService for SignOcr {
        fn annotate(&self, _image: &EncodedImage, _mode: DetectionMode) -> OcrFuture {
            Box::pin(async {
                let annotation: TextAnnotation = serde_json::from_value(serde_json::json!({
                    "text": "Abierto",
                    "pages": [{
                        "width": 400,
                        "height": 300,
                        "blocks": [{
                            "boundingBox": {"vertices": [
                                {"x": 40, "y": 30}, {"x": 200, "y": 30},
                                {"x": 200, "y": 60}, {"x": 40, "y": 60}
                            ]},
                            "paragraphs": [{"words": [{"symbols": [{"text": "Abierto"}]}]}]
                        }]
                    }]
                }))?;
                Ok::<_, anyhow::Error>(Some(annotation))
            })
        }
    }

    /// Answers after a short delay so submissions are still pending at exit.
    struct SlowTranslate;

    impl TranslationService for SlowTranslate {
        fn translate_batch(&self, texts: Vec<String>, _target_lang: &str) -> TranslateFuture {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(texts
                    .into_iter()
                    .map(|text| TranslationItem {
                        translated_text: text.replace("Abierto", "Open"),
                        detected_source_language: Some("es".to_string()),
                    })
                    .collect())
            })
        }
    }

    fn state() -> InteractiveState<SignOcr, SlowTranslate> {
        let image = EncodedImage {
            bytes: vec![0xff, 0xd8, 0xff],
            mime: "image/jpeg",
            width: 400,
            height: 300,
        };
        let translator = Translator::new(SignOcr, SlowTranslate, Settings::default());
        InteractiveState::new(translator, image, "en".to_string())
    }

    #[tokio::test]
    async fn pending_submissions_finish_before_exit() {
        let mut state = state();
        state.submit("es".to_string());
        state.submit("en".to_string());
        assert_eq!(state.session.current_key(), None);

        state.drain().await;
        assert!(state.tasks.is_empty());
        assert_eq!(
            state.session.current_key(),
            Some(SubmissionKey::new(state.image.key(), "en"))
        );
        let result = state.session.current().expect("result");
        assert_eq!(result.blocks[0].translated_text, "Open");
    }

    #[tokio::test]
    async fn toggle_checks_the_block_count() {
        let mut state = state();
        assert!(run_command("/toggle 0", &mut state).is_err());

        state.submit("en".to_string());
        state.drain().await;
        assert!(!run_command("/toggle 0", &mut state).expect("toggle"));
        assert_eq!(state.session.stickers().state(0), StickerState::Expanded);
        assert!(run_command("/toggle 1", &mut state).is_err());
    }

    #[test]
    fn malformed_commands_keep_the_session_open() {
        let mut state = state();
        for input in ["/toggle x", "/container foo", "/format yaml"] {
            assert!(run_command(input, &mut state).is_err());
            assert!(!handle_interactive_command(input, &mut state));
        }
        assert_eq!(state.format, OutputFormat::Json);
        assert_eq!(state.container, None);

        assert!(!handle_interactive_command("/container 390x292.5", &mut state));
        assert_eq!(state.container, Some(Size::new(390.0, 292.5)));
        assert!(handle_interactive_command("/quit", &mut state));
    }
}
