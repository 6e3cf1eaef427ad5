//! GR2 inspect command
//!
//! Loads a GR2 file and dumps the header, file info, sector table and
//! the parsed element tree, either to the terminal or as a JSON summary.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::elements::Element;
use crate::reader::Gr2;
use crate::structures::Compression;
use crate::typeinfo::TypeId;

#[derive(Serialize)]
struct FileSummary {
    format: i32,
    pointer_bits: u32,
    big_endian_mismatch: bool,
    total_size: u32,
    tag: String,
    sector_count: u32,
    sectors: Vec<SectorSummary>,
    element_count: usize,
    elements: Vec<ElementSummary>,
}

#[derive(Serialize)]
struct SectorSummary {
    index: usize,
    compression: String,
    data_offset: u32,
    compressed_len: u32,
    decompressed_len: u32,
    fixup_count: u32,
    marshal_count: u32,
}

#[derive(Serialize)]
struct ElementSummary {
    name: Option<String>,
    type_name: String,
    size: u32,
    children: usize,
}

fn compression_name(compression: Compression) -> &'static str {
    match compression {
        Compression::None => "none",
        Compression::Oodle0 => "oodle0",
        Compression::Oodle1 => "oodle1",
        Compression::BitKnit1 => "bitknit1",
        Compression::BitKnit2 => "bitknit2",
    }
}

fn type_name(element: &Element) -> &'static str {
    element.type_id().map_or("<invalid>", TypeId::name)
}

/// Inspect a GR2 file and display its structure.
pub fn inspect(path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let gr2 = Gr2::from_bytes(&bytes)
        .with_context(|| format!("cannot load {}", path.display()))?;

    if let Some(out_path) = output {
        let summary = build_summary(&gr2);
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(out_path, json)?;
        println!("Written to: {}", out_path.display());
        return Ok(());
    }

    println!("Inspecting GR2 file: {}", path.display());
    println!();

    println!("GR2 File Information");
    println!("====================");
    println!("Format:      {}", gr2.file_info.format);
    println!("Pointers:    {}-bit", if gr2.is_64bit { 64 } else { 32 });
    println!("File size:   {} bytes", gr2.file_info.total_size);
    println!("Tag:         {:#010x}", gr2.file_info.tag);
    println!("CRC32:       {:#010x}", gr2.file_info.crc32);
    println!(
        "Type ref:    sector {} position {}",
        gr2.file_info.type_ref.sector, gr2.file_info.type_ref.position
    );
    println!(
        "Root ref:    sector {} position {}",
        gr2.file_info.root_ref.sector, gr2.file_info.root_ref.position
    );
    println!("Sectors:     {}", gr2.file_info.sector_count);
    println!();

    println!("Sectors:");
    println!("--------");
    for (i, sector) in gr2.sectors.iter().enumerate() {
        let ratio = sector
            .compression_ratio()
            .map_or_else(|| "N/A".to_string(), |r| format!("{r:.2}x"));
        println!(
            "  [{:2}] {:8} @{:#010x} | {:>8} -> {:>8} bytes ({}) | fixups {} marshals {}",
            i,
            compression_name(sector.compression),
            sector.data_offset,
            sector.compressed_len,
            sector.decompressed_len,
            ratio,
            sector.fixup_count,
            sector.marshal_count,
        );
    }
    println!();

    println!("Elements ({}):", gr2.elements.len());
    println!("---------");
    for child in &gr2.root.children {
        print_tree(&gr2, *child, 1);
    }

    Ok(())
}

fn print_tree(gr2: &Gr2, id: usize, depth: usize) {
    let Some(element) = gr2.element(id) else {
        return;
    };

    let indent = "  ".repeat(depth);
    let name = element.name.as_deref().unwrap_or("<unnamed>");
    let mut line = format!("{indent}{name}: {} [{}]", type_name(element), element.size);
    if let Some(text) = gr2.string_value(element) {
        line.push_str(&format!(" = {text:?}"));
    }
    println!("{line}");

    for child in &element.children {
        print_tree(gr2, *child, depth + 1);
    }
}

fn build_summary(gr2: &Gr2) -> FileSummary {
    FileSummary {
        format: gr2.file_info.format,
        pointer_bits: if gr2.is_64bit { 64 } else { 32 },
        big_endian_mismatch: gr2.mismatch_endianness,
        total_size: gr2.file_info.total_size,
        tag: format!("{:#010x}", gr2.file_info.tag),
        sector_count: gr2.file_info.sector_count,
        sectors: gr2
            .sectors
            .iter()
            .enumerate()
            .map(|(index, sector)| SectorSummary {
                index,
                compression: compression_name(sector.compression).to_string(),
                data_offset: sector.data_offset,
                compressed_len: sector.compressed_len,
                decompressed_len: sector.decompressed_len,
                fixup_count: sector.fixup_count,
                marshal_count: sector.marshal_count,
            })
            .collect(),
        element_count: gr2.elements.len(),
        elements: gr2
            .elements
            .iter()
            .map(|element| ElementSummary {
                name: element.name.clone(),
                type_name: type_name(element).to_string(),
                size: element.size,
                children: element.children.len(),
            })
            .collect(),
    }
}
