use std::collections::BTreeMap;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use subdec::process::extract::{Extractor, Framing, Record};
use subdec::process::{
    RECORD_TYPE_CC, RECORD_TYPE_DVB, RECORD_TYPE_MKV_VOB, RECORD_TYPE_PES, RECORD_TYPE_PGS,
    RECORD_TYPE_SSA, RECORD_TYPE_TELETEXT, RECORD_TYPE_TEXT, RECORD_TYPE_TEXT_DURATION,
    RECORD_TYPE_TEXT_DURATION_ALT, RECORD_TYPE_TIMED_TEXT, RECORD_TYPE_VOB, SUP_MAGIC,
};
use subdec::structs::timestamp::Pts;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing subtitle stream: {}", args.input.display());
    log::debug!("Fail level {} (strict mode: {})", cli.fail_level(), cli.strict);

    let analysis = analyze_stream(args, multi)?;
    if analysis.records.is_empty() {
        println!("No subtitle records found in the file.");
        println!("Check the input format with --type.");
        return Ok(());
    }

    display_summary(&analysis);
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RecordStats {
    count: usize,
    bytes: usize,
    first: Option<Pts>,
    last: Option<Pts>,
}

impl RecordStats {
    fn add(&mut self, record: &Record) {
        self.count += 1;
        self.bytes += record.payload.len();
        if record.pts.0 != 0 {
            self.first = Some(self.first.map_or(record.pts, |first| first.min(record.pts)));
            self.last = Some(self.last.map_or(record.pts, |last| last.max(record.pts)));
        }
    }
}

#[derive(Debug)]
struct Analysis {
    framing: Framing,
    records: BTreeMap<u32, RecordStats>,
    resync_errors: usize,
    total_bytes: usize,
}

/// SUP files start with a `'P''G'` segment header.
fn detect_framing(head: &[u8]) -> Framing {
    if head.len() >= 2 && u16::from_be_bytes([head[0], head[1]]) == SUP_MAGIC {
        Framing::Sup
    } else {
        Framing::Record
    }
}

fn analyze_stream(args: &InfoArgs, multi: Option<&MultiProgress>) -> Result<Analysis> {
    let mut input_reader = InputReader::new(&args.input)?;
    if input_reader.is_pipe() {
        log::debug!("Reading from stdin");
    }

    let pb = if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {pos} records {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("analyzing");
        Some(pb)
    } else {
        None
    };

    let mut extractor: Option<Extractor> = args.kind.map(|kind| Extractor::new(kind.framing()));
    let mut records = BTreeMap::<u32, RecordStats>::new();
    let mut total_bytes = 0usize;

    let mut collect = |extractor: &mut Extractor| {
        for result in extractor.by_ref() {
            match result {
                Ok(record) => {
                    records.entry(record.type_code).or_default().add(&record);
                    if let Some(pb) = &pb {
                        pb.inc(1);
                    }
                }
                Err(e) => log::debug!("Resync: {e}"),
            }
        }
    };

    input_reader.process_chunks(64 * 1024, |chunk| {
        total_bytes += chunk.len();
        let extractor = extractor.get_or_insert_with(|| {
            let framing = detect_framing(chunk);
            log::info!("Detected {framing:?} framing");
            Extractor::new(framing)
        });
        extractor.push_bytes(chunk);
        collect(extractor);
        Ok(true)
    })?;

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let (framing, resync_errors) = extractor
        .as_ref()
        .map_or((Framing::Record, 0), |e| (e.framing(), e.error_count()));

    Ok(Analysis {
        framing,
        records,
        resync_errors,
        total_bytes,
    })
}

fn record_type_name(framing: Framing, type_code: u32) -> &'static str {
    if framing == Framing::Sup {
        return match type_code {
            0x14 => "PGS palette",
            0x15 => "PGS object",
            0x16 => "PGS composition",
            0x17 => "PGS window",
            0x80 => "PGS end",
            _ => "PGS unknown",
        };
    }

    match type_code {
        RECORD_TYPE_VOB => "VOB",
        RECORD_TYPE_PGS => "PGS",
        RECORD_TYPE_TEXT => "UTF-8 text",
        RECORD_TYPE_SSA => "SSA/ASS",
        RECORD_TYPE_TIMED_TEXT => "timed text",
        RECORD_TYPE_MKV_VOB => "MKV VOB",
        RECORD_TYPE_DVB => "DVB",
        RECORD_TYPE_TELETEXT => "teletext",
        RECORD_TYPE_CC => "closed caption",
        RECORD_TYPE_TEXT_DURATION | RECORD_TYPE_TEXT_DURATION_ALT => "text with duration",
        RECORD_TYPE_PES => "PES private stream 1",
        _ => "unknown",
    }
}

fn display_summary(analysis: &Analysis) {
    let record_count: usize = analysis.records.values().map(|s| s.count).sum();
    let size_mb = analysis.total_bytes as f64 / (1024.0 * 1024.0);

    println!();
    println!("Subtitle Stream Information");
    println!("===========================");
    println!();
    println!("  Framing                   {:?}", analysis.framing);
    println!("  Records                   {record_count}");
    println!("  Resync errors             {}", analysis.resync_errors);
    println!("  Size                      {size_mb:.2} MB ({} bytes)", analysis.total_bytes);
    println!();
    println!("Record Types");

    for (type_code, stats) in &analysis.records {
        println!(
            "  {type_code:#07X} {:<20} {:>8} records {:>10} bytes",
            record_type_name(analysis.framing, *type_code),
            stats.count,
            stats.bytes
        );
        if let (Some(first), Some(last)) = (stats.first, stats.last) {
            println!("          {first} .. {last}");
        }
    }
    println!();
}
