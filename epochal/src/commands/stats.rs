use std::io::BufRead;
use std::path::Path;

use anyhow::Result;
use car_reader::node::peek_kind;
use car_reader::{CarSectionReader, Kind};
use tracing::info;

#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub sections: u64,
    pub bytes: u64,
    pub count_by_kind: [u64; Kind::ALL.len()],
    pub bytes_by_kind: [u64; Kind::ALL.len()],
}

/// Streams a whole archive and tallies section counts and bytes per
/// node kind. Accepts plain `.car` files and zstd-compressed `.zst`
/// ones; compressed inputs report decompressed sizes.
pub fn stats_archive(input: &Path, chunk_size: usize, progress_every: u64) -> Result<ArchiveReport> {
    let zstd = input.extension().is_some_and(|e| e == "zst");
    let report = if zstd {
        scan(CarSectionReader::open_zstd(input, chunk_size)?, progress_every)?
    } else {
        scan(CarSectionReader::open(input, chunk_size)?, progress_every)?
    };
    info!(
        input = %input.display(),
        sections = report.sections,
        bytes = report.bytes,
        "archive scan complete"
    );
    Ok(report)
}

fn scan<R: BufRead>(mut car: CarSectionReader<R>, progress_every: u64) -> Result<ArchiveReport> {
    let mut report = ArchiveReport::default();
    while let Some(section) = car.next_section()? {
        let kind = peek_kind(&section.payload)?;
        report.sections += 1;
        report.bytes += section.length;
        report.count_by_kind[kind as usize] += 1;
        report.bytes_by_kind[kind as usize] += section.length;
        if progress_every > 0 && report.sections % progress_every == 0 {
            info!(
                sections = report.sections,
                offset = car.position(),
                "scan progress"
            );
        }
    }
    Ok(report)
}

pub fn print_archive_report(report: &ArchiveReport) {
    println!("sections: {}", report.sections);
    println!("bytes:    {}", report.bytes);
    println!();
    println!("{:<12} {:>12} {:>16} {:>7}", "kind", "count", "bytes", "pct");
    for kind in Kind::ALL {
        let i = kind as usize;
        if report.count_by_kind[i] == 0 {
            continue;
        }
        let pct = if report.bytes > 0 {
            report.bytes_by_kind[i] as f64 * 100.0 / report.bytes as f64
        } else {
            0.0
        };
        println!(
            "{:<12} {:>12} {:>16} {:>6.2}%",
            kind.name(),
            report.count_by_kind[i],
            report.bytes_by_kind[i],
            pct
        );
    }
}
