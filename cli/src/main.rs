//! trellis CLI - build a token tree against a live oracle and write the
//! JSON artifact the viewer consumes.
//!
//! Backends: a local llama.cpp server (`LLAMA_SERVER_URL`, default
//! `http://127.0.0.1:8080`) or the Gemini API (`GOOGLE_API_KEY`, model via
//! `GEMINI_MODEL`). `trace` runs a single Gemini generation and prints the
//! per-step candidate probabilities instead of building a tree.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use trellis_engine::artifact::TreeArtifact;
use trellis_engine::expand::{build_token_tree, BuildConfig};
use trellis_engine::sampler::Sampler;
use trellis_samplers::gemini::GeminiSampler;
use trellis_samplers::llama::LlamaServerSampler;

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("build") => run_build(&args[2..]),
        Some("trace") => run_trace(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("trellis v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage:");
    println!("  trellis build <prompt> [options]    Build a token tree and write JSON");
    println!("  trellis trace <input> [--top-k N]   One Gemini generation, per-step top-K");
    println!();
    println!("Build options:");
    println!("  --backend llama|gemini   Oracle backend (default: llama)");
    println!("  --max-depth N            Expansion rounds (default: 4)");
    println!("  --top-k N                Alternatives per step (default: 5)");
    println!("  --temperature T          Oracle temperature (default: 0)");
    println!("  --beam-width N           Frontier cap per round (default: none)");
    println!("  --min-branch-prob P      Probability floor for branches (default: none)");
    println!("  --top-p P                Nucleus mass cutoff (default: none)");
    println!("  --max-len N              Stop a branch once the continuation reaches N chars (default: 500)");
    println!("  --out PATH               Output file (default: outputs/token-tree--<prompt>.json)");
    println!();
    println!("Environment:");
    println!("  LLAMA_SERVER_URL   llama.cpp server root (default: http://127.0.0.1:8080)");
    println!("  GOOGLE_API_KEY     API key for the gemini backend");
    println!("  GEMINI_MODEL       Gemini model name (default: gemini-1.5-flash)");
}

fn run_build(args: &[String]) -> Result<()> {
    let mut prompt: Option<String> = None;
    let mut backend = String::from("llama");
    let mut out: Option<PathBuf> = None;
    let mut max_len: usize = 500;
    // Temperature 0 reports the least reshaped probabilities; since every
    // branch is explored anyway, sampling randomness buys nothing here.
    let mut config = BuildConfig {
        max_depth: 4,
        top_k_per_step: 5,
        beam_width: None,
        min_branch_prob: None,
        top_p_mass: None,
        temperature: 0.0,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--backend" => backend = next_value(&mut iter, arg)?.clone(),
            "--max-depth" => {
                config.max_depth = parse_flag(next_value(&mut iter, arg)?, arg)?;
            }
            "--top-k" => {
                config.top_k_per_step = parse_flag(next_value(&mut iter, arg)?, arg)?;
            }
            "--temperature" => {
                config.temperature = parse_flag(next_value(&mut iter, arg)?, arg)?;
            }
            "--beam-width" => {
                config.beam_width = Some(parse_flag(next_value(&mut iter, arg)?, arg)?);
            }
            "--min-branch-prob" => {
                config.min_branch_prob = Some(parse_flag(next_value(&mut iter, arg)?, arg)?);
            }
            "--top-p" => {
                config.top_p_mass = Some(parse_flag(next_value(&mut iter, arg)?, arg)?);
            }
            "--max-len" => {
                max_len = parse_flag(next_value(&mut iter, arg)?, arg)?;
            }
            "--out" => out = Some(PathBuf::from(next_value(&mut iter, arg)?)),
            other if !other.starts_with("--") && prompt.is_none() => {
                prompt = Some(other.to_string());
            }
            other => bail!("unrecognized argument: {other}"),
        }
    }
    let prompt = prompt.context("missing prompt; try: trellis build \"The capital of France is\"")?;

    let sampler: Box<dyn Sampler> = match backend.as_str() {
        "llama" => {
            let url = std::env::var("LLAMA_SERVER_URL")
                .unwrap_or_else(|_| String::from("http://127.0.0.1:8080"));
            Box::new(LlamaServerSampler::new(url)?)
        }
        "gemini" => {
            let api_key = std::env::var("GOOGLE_API_KEY")
                .context("GOOGLE_API_KEY must be set for the gemini backend")?;
            let model = std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| String::from("gemini-1.5-flash"));
            Box::new(GeminiSampler::new(api_key, model)?)
        }
        other => bail!("unknown backend {other:?} (expected llama or gemini)"),
    };

    // Stop a branch on a blank line or once the continuation gets long.
    let prompt_len = prompt.len();
    let stop_if = move |text: &str| {
        text.is_empty() || text.ends_with("\n\n") || text.len() > prompt_len + max_len
    };

    log::info!(
        "building tree for {:?} (depth {}, top-k {}, backend {})",
        prompt,
        config.max_depth,
        config.top_k_per_step,
        backend
    );
    let build = build_token_tree(sampler.as_ref(), &prompt, &config, stop_if)?;

    if !build.failures.is_empty() {
        eprintln!("{} branch(es) truncated by oracle failures:", build.failures.len());
        for failure in &build.failures {
            eprintln!("  depth {}: {}", failure.depth, failure.error);
        }
    }

    let artifact = TreeArtifact::new(&config, prompt.clone(), build.root);
    let json = artifact.to_json()?;

    let path = out.unwrap_or_else(|| default_output_path(&prompt));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&path, &json).with_context(|| format!("writing {}", path.display()))?;
    println!(
        "wrote {} nodes (depth {}) to {}",
        artifact.tree.size(),
        artifact.tree.depth(),
        path.display()
    );
    Ok(())
}

fn run_trace(args: &[String]) -> Result<()> {
    let mut input: Option<String> = None;
    let mut top_k: usize = 5;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--top-k" => top_k = parse_flag(next_value(&mut iter, arg)?, arg)?,
            other if !other.starts_with("--") && input.is_none() => {
                input = Some(other.to_string());
            }
            other => bail!("unrecognized argument: {other}"),
        }
    }
    let input = input.context("missing input; try: trellis trace \"What is the capital of France?\"")?;

    let api_key =
        std::env::var("GOOGLE_API_KEY").context("GOOGLE_API_KEY must be set for trace")?;
    let model =
        std::env::var("GEMINI_MODEL").unwrap_or_else(|_| String::from("gemini-1.5-flash"));
    let sampler = GeminiSampler::new(api_key, model)?;

    let trace = sampler.trace(&input, top_k)?;
    println!("Output: {}", trace.output_text);
    println!();
    println!("{}", serde_json::to_string_pretty(&trace.probability_tree)?);
    Ok(())
}

fn next_value<'a>(iter: &mut std::slice::Iter<'a, String>, flag: &str) -> Result<&'a String> {
    iter.next().with_context(|| format!("{flag} expects a value"))
}

fn parse_flag<T>(value: &str, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("{flag} got an unparseable value: {value:?}"))
}

/// `outputs/token-tree--<prompt with spaces dashed, lowercased>.json`
fn default_output_path(prompt: &str) -> PathBuf {
    let slug: String = prompt
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .collect();
    PathBuf::from("outputs").join(format!("token-tree--{slug}.json"))
}
