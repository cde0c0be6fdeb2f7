use bio::io::fasta;
use clap::Parser;
use log::{info, warn};
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use strainer::linker::split_segment;
use strainer::read_table::{parse_read_table_file, ReadTable};
use strainer::{
    build_strainer, CrawlOptions, MaterializeOptions, NoProgress, Segment, SegmentMethod,
    StrainerResult, StrategyId,
};

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Tab-separated read table: name, sequence, start, end, diffs and an optional group.
    #[clap(short = 'r', long, value_parser)]
    reads: String,

    /// Region to strain as `seq_name:start-end`. Defaults to the extent of the
    /// reads on every sequence.
    #[clap(short = 'R', long, value_parser)]
    region: Option<String>,

    /// Number of threads for parallel processing (default: all cores).
    #[clap(short = 't', long, value_parser)]
    num_threads: Option<NonZeroUsize>,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Options forwarded to the strainers
#[derive(Parser, Debug)]
struct CrawlOpts {
    /// Minimum number of bases two reads must share to be chained.
    #[clap(short = 'o', long, value_parser, default_value_t = 80)]
    minimum_overlap: u32,

    /// Largest fraction of differing positions for two sequences to match.
    #[clap(short = 'd', long, value_parser, default_value_t = 0.01)]
    max_diff: f64,

    /// Largest divergence of a donor used to complete a partial strain.
    #[clap(long, value_parser, default_value_t = 0.02)]
    completion_tolerance: f64,

    /// Compare reads over their whole overlap instead of only inside the region.
    #[clap(long, action)]
    unrestricted: bool,

    /// Merge the reads of duplicate strains instead of dropping them.
    #[clap(long, action)]
    keep_all_reads: bool,

    /// Count ambiguous bases (N) as differences.
    #[clap(long, action)]
    count_ambiguous: bool,

    /// Segment linker: cut sub-segments by "length" or by "reads".
    #[clap(long, value_parser, default_value = "length")]
    segment_method: String,

    /// Segment linker: bases or reads per sub-segment.
    #[clap(long, value_parser, default_value_t = 2000)]
    segment_size: u32,

    /// Strategy run per sub-problem by the segment linker and the substrainer.
    #[clap(long, value_parser, default_value = "gene-crawler")]
    inner: String,
}

impl CrawlOpts {
    fn to_options(&self) -> io::Result<CrawlOptions> {
        let options = CrawlOptions::default()
            .with_minimum_overlap(self.minimum_overlap)
            .with_maximum_diff_fraction(self.max_diff)
            .with_completion_tolerance(self.completion_tolerance)
            .with_restrict_matches_to_segment(!self.unrestricted)
            .with_keep_all_reads(self.keep_all_reads)
            .with_ignore_ambiguous(!self.count_ambiguous)
            .with_segmentation(parse_segment_method(&self.segment_method)?, self.segment_size)
            .with_inner_strainer(self.inner.parse::<StrategyId>()?);
        options.validate()?;
        Ok(options)
    }
}

/// Command-line tool for reconstructing variant strains from aligned reads.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Partition the reads over each region into strains
    Strain {
        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        crawl: CrawlOpts,

        /// Strategy: manual, simple-gene-crawler, gene-crawler, segment-linker or
        /// substrainer
        #[clap(short = 's', long, value_parser, default_value = "gene-crawler")]
        strategy: String,

        /// Reference FASTA used to materialize strain sequences (requires --fasta)
        #[clap(long, value_parser)]
        reference: Option<String>,

        /// Write strain sequences as FASTA to this file (requires --reference)
        #[clap(long, value_parser)]
        fasta: Option<String>,

        /// Fill positions a strain does not cover with reference bases
        #[clap(long, action)]
        fill_from_composite: bool,

        /// Translate strain sequences to protein, folding strains that translate alike
        #[clap(long, action)]
        amino_acids: bool,

        /// Write a binary snapshot of the result (single region only)
        #[clap(long, value_parser)]
        snapshot: Option<String>,
    },
    /// Print the sub-segments the segment linker would crawl
    Segments {
        #[clap(flatten)]
        common: CommonOpts,

        /// Cut sub-segments by "length" or by "reads"
        #[clap(long, value_parser, default_value = "length")]
        segment_method: String,

        /// Bases or reads per sub-segment
        #[clap(long, value_parser, default_value_t = 2000)]
        segment_size: u32,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Strain {
            common,
            crawl,
            strategy,
            reference,
            fasta,
            fill_from_composite,
            amino_acids,
            snapshot,
        } => {
            let table = initialize(&common)?;
            let options = crawl.to_options()?.with_materialize(MaterializeOptions {
                fill_from_composite,
                convert_to_amino_acids: amino_acids,
            });
            let strategy = strategy.parse::<StrategyId>()?;
            let regions = resolve_regions(&table, common.region.as_deref())?;
            if snapshot.is_some() && regions.len() != 1 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "--snapshot needs a single region; pass --region",
                ));
            }
            let references = match (&fasta, &reference) {
                (Some(_), None) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "--fasta requires --reference",
                    ))
                }
                (None, Some(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "--reference is only read for --fasta output",
                    ))
                }
                (Some(_), Some(path)) => read_reference(path)?,
                (None, None) => FxHashMap::default(),
            };

            let context = table.into_context()?;
            let strainer = build_strainer(strategy, &options, &context)?;

            let mut fasta_writer = match &fasta {
                Some(path) => Some(BufWriter::new(File::create(path)?)),
                None => None,
            };
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());

            for region in &regions {
                let mut result = strainer.strain(region, None, &NoProgress)?;
                info!("{}: {} strains with {}", region, result.size(), strategy);
                write_strains(&mut out, region, &result)?;

                if let Some(writer) = fasta_writer.as_mut() {
                    match lookup_reference(&references, &region.sequence_id) {
                        Some(bases) => {
                            let sequences =
                                result.materialize_sequences(bases, &options.materialize)?;
                            for (name, sequence) in sequences {
                                writeln!(writer, ">{} {}", name, region)?;
                                writeln!(writer, "{}", sequence)?;
                            }
                        }
                        None => warn!(
                            "No reference sequence for {}, skipping FASTA output",
                            region.sequence_id
                        ),
                    }
                }

                if let Some(path) = &snapshot {
                    result.write_snapshot(Path::new(path))?;
                    info!("Wrote snapshot of {} to {}", region, path);
                }
            }

            out.flush()?;
            if let Some(mut writer) = fasta_writer {
                writer.flush()?;
            }
        }
        Args::Segments {
            common,
            segment_method,
            segment_size,
        } => {
            let table = initialize(&common)?;
            let method = parse_segment_method(&segment_method)?;
            if segment_size == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "--segment-size must be at least 1",
                ));
            }
            for region in resolve_regions(&table, common.region.as_deref())? {
                for piece in split_segment(&region, &table.reads, method, segment_size) {
                    let reads = table.reads.iter().filter(|r| r.intersects(&piece)).count();
                    println!("{}\t{}\t{}\t{}", piece.sequence_id, piece.start, piece.end, reads);
                }
            }
        }
    }

    Ok(())
}

/// Initialize logging and the thread pool, then load the read table
fn initialize(common: &CommonOpts) -> io::Result<ReadTable> {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let num_threads = common
        .num_threads
        .map(NonZeroUsize::get)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(io::Error::other)?;

    let table = parse_read_table_file(Path::new(&common.reads))?;
    info!(
        "Loaded {} reads on {} sequences from {}",
        table.reads.len(),
        table.sequences().len(),
        common.reads
    );
    Ok(table)
}

fn parse_segment_method(method: &str) -> io::Result<SegmentMethod> {
    match method.to_ascii_lowercase().as_str() {
        "length" | "bases" => Ok(SegmentMethod::ByLength),
        "reads" | "read-count" => Ok(SegmentMethod::ByReadCount),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Unknown segment method '{}' (expected length or reads)", other),
        )),
    }
}

fn resolve_regions(table: &ReadTable, region: Option<&str>) -> io::Result<Vec<Segment>> {
    match region {
        Some(region) => Ok(vec![parse_region(region)?]),
        None => Ok(table
            .sequences()
            .into_iter()
            .filter_map(|seq| table.extent(seq))
            .collect()),
    }
}

fn parse_region(region: &str) -> io::Result<Segment> {
    let parts: Vec<&str> = region.rsplitn(2, ':').collect();
    if parts.len() != 2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Region format should be `seq_name:start-end`",
        ));
    }
    let (start, end) = parse_range(&parts[0].split('-').collect::<Vec<_>>())?;
    Ok(Segment::new(parts[1], start, end)?)
}

fn parse_range(range_parts: &[&str]) -> io::Result<(i64, i64)> {
    if range_parts.len() != 2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Range format should be `start-end`",
        ));
    }
    let parse = |field: &str| {
        field.trim().parse::<i64>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid range position '{}'", field),
            )
        })
    };
    let (start, end) = (parse(range_parts[0])?, parse(range_parts[1])?);
    if start < 1 || start > end {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid range {}-{}: positions are 1-based and start <= end", start, end),
        ));
    }
    Ok((start, end))
}

/// One line per strain: region, name, span, read count, difference count, reads
fn write_strains<W: Write>(
    out: &mut W,
    region: &Segment,
    result: &StrainerResult,
) -> io::Result<()> {
    for strain in result.iter() {
        let mut names: Vec<&str> = strain.reads().map(|r| r.name.as_str()).collect();
        names.sort_by(|a, b| natord::compare(a, b));
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            region,
            strain.name(),
            strain.start(),
            strain.end(),
            strain.read_count(),
            strain.alignment().diffs().len(),
            names.join(",")
        )?;
    }
    Ok(())
}

/// Reference sequences by record id
fn read_reference(path: &str) -> io::Result<FxHashMap<String, Vec<u8>>> {
    let reader = fasta::Reader::new(File::open(path)?);
    let mut sequences: FxHashMap<String, Vec<u8>> = FxHashMap::default();
    for record in reader.records() {
        let record = record?;
        if let Err(e) = record.check() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record {} in {}: {}", record.id(), path, e),
            ));
        }
        sequences.insert(record.id().to_string(), record.seq().to_vec());
    }
    info!("Loaded {} reference sequences from {}", sequences.len(), path);
    Ok(sequences)
}

/// Exact name first; a single-record reference serves every region.
fn lookup_reference<'a>(
    references: &'a FxHashMap<String, Vec<u8>>,
    name: &str,
) -> Option<&'a [u8]> {
    references
        .get(name)
        .or_else(|| (references.len() == 1).then(|| references.values().next()).flatten())
        .map(Vec::as_slice)
}
