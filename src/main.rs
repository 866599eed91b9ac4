//! varweave - Bayesian haplotype-based small-variant calling
//!
//! # Usage
//!
//! ```bash
//! # population calling over two samples
//! varweave call -R ref.fa -I s1=a.bam -I s2=b.bam -o calls.vcf
//!
//! # trio calling with de novo detection
//! varweave call -R ref.fa -I mum=m.bam -I dad=d.bam -I kid=k.bam \
//!     --caller trio --maternal-sample mum --paternal-sample dad
//!
//! # tumor/normal somatic calling
//! varweave call -R ref.fa -I normal=n.bam -I tumor=t.bam \
//!     --caller cancer --normal-sample normal
//! ```

extern crate varweave_lib;
pub mod commands;

use anyhow::Result;
use env_logger::Env;
use log::error;
use structopt::StructOpt;
use varweave_lib::core::errors::{is_broken_pipe, CallerError};

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case", author, about)]
/// Bayesian haplotype-based small-variant caller
struct Args {
    #[structopt(subcommand)]
    subcommand: Subcommand,
}

#[derive(StructOpt)]
enum Subcommand {
    /// Call small variants from aligned short reads
    Call(commands::CallArgs),
}

impl Subcommand {
    fn run(self) -> Result<()> {
        match self {
            Subcommand::Call(args) => commands::run_call(args)?,
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = Args::from_args().subcommand.run() {
        if is_broken_pipe(&err) {
            std::process::exit(0);
        }
        error!("{:#}", err);
        let code = err
            .downcast_ref::<CallerError>()
            .map(CallerError::exit_code)
            .unwrap_or(4);
        std::process::exit(code);
    }
    Ok(())
}
