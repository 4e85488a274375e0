use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use log::{error, info};
use serde::{Deserialize, Serialize};

use markov_core::io::mark_sentences;
use markov_core::model::{ChainOptions, Generator, TrainReport, Trainer};
use markov_core::store::{CounterStore, MemoryStore, WindowStore, TOKENS};
use markov_core::Error;

/// Largest accepted retrain body.
const MAX_CORPUS_BYTES: usize = 16 * 1024 * 1024;

/// Query parameters of the generation endpoints
#[derive(Deserialize)]
struct GenerateParams {
	count: Option<usize>,
	length: Option<usize>,
}

#[derive(Deserialize)]
struct RetrainParams {
	mark_sentences: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Stats {
	words: usize,
	windows: usize,
	last_id: u64,
	window_size: usize,
}

struct SharedData {
	store: Arc<MemoryStore>,
	options: ChainOptions,
	/// Held while a snapshot is written so later writes never lose earlier merges.
	snapshot: Mutex<PathBuf>,
}

impl SharedData {
	fn generator(&self) -> markov_core::Result<Generator<MemoryStore>> {
		Generator::open(Arc::clone(&self.store), self.options)
	}

	fn retrain(&self, text: &str) -> markov_core::Result<TrainReport> {
		let trainer = Trainer::retrain(Arc::clone(&self.store), text, self.options)?;
		let path = self.snapshot.lock().map_err(|_| Error::Poisoned)?;
		self.store.persist(&*path)?;
		Ok(*trainer.report())
	}

	fn stats(&self) -> markov_core::Result<Stats> {
		Ok(Stats {
			words: self.store.token_count()?,
			windows: self.store.window_count()?,
			last_id: self.store.counter(TOKENS)?,
			window_size: self.options.window_size(),
		})
	}
}

fn error_response(e: Error) -> HttpResponse {
	match e {
		Error::MissingSentinel | Error::NoStartSequence | Error::NotFound { .. } => {
			HttpResponse::NotFound().body(format!("No trained model: {e}"))
		}
		e if e.is_recoverable() => HttpResponse::Conflict().body(format!("Generation failed: {e}")),
		e => {
			error!("request failed: {}", e);
			HttpResponse::InternalServerError().body(e.to_string())
		}
	}
}

/// HTTP GET endpoint `/v1/generate`
///
/// Returns one sentence of `length` generated words (default 100).
#[get("/v1/generate")]
async fn get_generated(data: web::Data<SharedData>, query: web::Query<GenerateParams>) -> impl Responder {
	let length = query.length.unwrap_or(100);

	match data.generator().and_then(|generator| generator.generate(length)) {
		Ok(sentence) => HttpResponse::Ok().body(sentence),
		Err(e) => error_response(e),
	}
}

/// HTTP GET endpoint `/v1/sentences`
///
/// Returns up to `count` sentences (default 10) separated by blank lines.
/// Sentences that run into a dead end are skipped.
#[get("/v1/sentences")]
async fn get_sentences(data: web::Data<SharedData>, query: web::Query<GenerateParams>) -> impl Responder {
	let count = query.count.unwrap_or(10);
	let length = query.length.unwrap_or(100);

	let generator = match data.generator() {
		Ok(g) => g,
		Err(e) => return error_response(e),
	};
	match generator.generate_sentences(count, length, &AtomicBool::new(false)) {
		Ok(sentences) => HttpResponse::Ok().body(sentences.join("\n\n")),
		Err(e) => error_response(e),
	}
}

#[get("/v1/stats")]
async fn get_stats(data: web::Data<SharedData>) -> impl Responder {
	match data.stats() {
		Ok(stats) => HttpResponse::Ok().json(stats),
		Err(e) => error_response(e),
	}
}

/// HTTP POST endpoint `/v1/retrain`
///
/// Merges the request body into the model and rewrites the snapshot.
/// The text is used as-is unless `mark_sentences=true`.
#[post("/v1/retrain")]
async fn post_retrain(data: web::Data<SharedData>, query: web::Query<RetrainParams>, body: String) -> impl Responder {
	let mark = query.mark_sentences.unwrap_or(false);
	let shared = data.clone();

	let result = web::block(move || {
		let text = if mark { mark_sentences(&body) } else { body };
		shared.retrain(&text)
	})
	.await;

	match result {
		Ok(Ok(report)) => HttpResponse::Ok().body(format!(
			"{} tokens, {} new words, {} windows ({} rows inserted, {} updated)",
			report.tokens, report.new_words, report.windows, report.rows.inserted, report.rows.updated
		)),
		Ok(Err(e)) => error_response(e),
		Err(_) => HttpResponse::InternalServerError().body("Retrain task failed"),
	}
}

fn routes(cfg: &mut web::ServiceConfig) {
	cfg.app_data(web::PayloadConfig::new(MAX_CORPUS_BYTES))
		.service(get_generated)
		.service(get_sentences)
		.service(get_stats)
		.service(post_retrain);
}

/// Main entry point for the server.
///
/// Opens the snapshot named by the first argument (default `model.bin`),
/// shares it across workers and serves the `/v1` endpoints.
///
/// # Notes
/// - The server binds to 127.0.0.1:5000.
/// - Retrain requests rewrite the snapshot once their merge completes.
#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();

	let snapshot = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("model.bin"));
	let store = Arc::new(MemoryStore::open(&snapshot)?);
	let options = ChainOptions::default().with_stored_window_size(&*store)?;
	info!("serving {} (window size {})", snapshot.display(), options.window_size());

	let shared_data = web::Data::new(SharedData { store, options, snapshot: Mutex::new(snapshot) });

	HttpServer::new(move || App::new().app_data(shared_data.clone()).configure(routes))
		.bind(("127.0.0.1", 5000))?
		.run()
		.await?;
	Ok(())
}
