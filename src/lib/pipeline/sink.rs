//! A VCF-shaped text sink.
//!
//! Writes one tab-separated record per call with the standard FORMAT
//! columns (GT, GQ, DP, MQ, PS). Full-fidelity VCF output is the output
//! adapter's business; this sink keeps the record stream readable and
//! diffable.

use crate::core::errors::Result;
use crate::pipeline::providers::{CallKind, CallRecord, CallSink};
use std::io::Write;

pub struct TextCallSink<W: Write> {
    writer: W,
    samples: Vec<String>,
    wrote_header: bool,
}

impl<W: Write> TextCallSink<W> {
    pub fn new(writer: W, samples: Vec<String>) -> Self {
        TextCallSink {
            writer,
            samples,
            wrote_header: false,
        }
    }

    fn write_header(&mut self) -> Result<()> {
        writeln!(self.writer, "##fileformat=VCFv4.3")?;
        writeln!(self.writer, "##source=varweave")?;
        writeln!(
            self.writer,
            "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"
        )?;
        writeln!(
            self.writer,
            "##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype quality\">"
        )?;
        writeln!(
            self.writer,
            "##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">"
        )?;
        writeln!(
            self.writer,
            "##FORMAT=<ID=MQ,Number=1,Type=Integer,Description=\"Mapping quality\">"
        )?;
        writeln!(
            self.writer,
            "##FORMAT=<ID=PS,Number=1,Type=Integer,Description=\"Phase set\">"
        )?;
        write!(self.writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
        for sample in &self.samples {
            write!(self.writer, "\t{}", sample)?;
        }
        writeln!(self.writer)?;
        Ok(())
    }
}

fn sequence_or_dot(sequence: &[u8]) -> String {
    if sequence.is_empty() {
        ".".to_string()
    } else {
        String::from_utf8_lossy(sequence).into_owned()
    }
}

impl<W: Write> CallSink for TextCallSink<W> {
    fn write(&mut self, record: &CallRecord) -> Result<()> {
        if !self.wrote_header {
            self.write_header()?;
            self.wrote_header = true;
        }
        let region = record.region();
        let mut info: Vec<String> = record
            .info
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        match record.kind {
            CallKind::Denovo => info.push("DENOVO".to_string()),
            CallKind::Reference => info.push("REFCALL".to_string()),
            _ => {}
        }
        write!(
            self.writer,
            "{}\t{}\t.\t{}\t{}\t{:.2}\tPASS\t{}\tGT:GQ:DP:MQ:PS",
            region.contig(),
            region.begin() + 1,
            sequence_or_dot(record.variant.ref_allele().sequence()),
            sequence_or_dot(record.variant.alt_allele().sequence()),
            record.posterior.score(),
            if info.is_empty() {
                ".".to_string()
            } else {
                info.join(";")
            },
        )?;
        for sample in &self.samples {
            match record.samples.iter().find(|s| &s.sample == sample) {
                Some(call) => {
                    let ps = call
                        .phase_set
                        .map(|p| (p + 1).to_string())
                        .unwrap_or_else(|| ".".to_string());
                    write!(
                        self.writer,
                        "\t{}:{}:{}:{}:{}",
                        call.gt_string(),
                        call.genotype_quality.round() as i64,
                        record.depth,
                        record.mapping_quality.round() as i64,
                        ps
                    )?;
                }
                None => write!(self.writer, "\t.")?,
            }
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.wrote_header {
            self.write_header()?;
            self.wrote_header = true;
        }
        self.writer.flush()?;
        Ok(())
    }
}
