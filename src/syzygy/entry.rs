//! Tablebase registry entries and file parsing.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::Mmap;

use super::encode::{Enc, EncInfo};
use super::pairs::{self, read_u16_le, read_u32_le};

pub const WDL: usize = 0;
pub const DTZ: usize = 1;
pub const SUFFIX: [&str; 2] = [".rtbw", ".rtbz"];
const MAGIC: [u32; 2] = [0x5d23_e871, 0xa50c_66d7];

/// One fully parsed table file.
pub struct TableData {
    mmap: Mmap,
    /// Sub-table layouts; WDL tables hold both sides (second half), DTZ
    /// only one.
    pub ei: Vec<EncInfo>,
    pub split: bool,
    pub dtz_flags: [u8; 4],
    pub dtz_map: usize,
    pub dtz_map_idx: [[u16; 4]; 4],
}

impl TableData {
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

/// One registered material signature with lazily initialized WDL/DTZ data.
pub struct BaseEntry {
    pub key: u64,
    pub acronym: String,
    pub num: u8,
    pub symmetric: bool,
    pub has_pawns: bool,
    pub has_dtz: bool,
    pub kk_enc: bool,
    /// Pawn counts, leading (more-numerous or only) color first.
    pub pawns: [u8; 2],
    /// Double-checked per-table initialization; `None` marks a table that
    /// failed to parse and stays unavailable.
    tables: [OnceLock<Option<TableData>>; 2],
}

impl BaseEntry {
    pub fn new(
        key: u64,
        acronym: String,
        num: u8,
        symmetric: bool,
        has_pawns: bool,
        has_dtz: bool,
        kk_enc: bool,
        pawns: [u8; 2],
    ) -> Self {
        BaseEntry {
            key,
            acronym,
            num,
            symmetric,
            has_pawns,
            has_dtz,
            kk_enc,
            pawns,
            tables: [OnceLock::new(), OnceLock::new()],
        }
    }

    fn num_tables(&self, _type_: usize) -> usize {
        if self.has_pawns {
            4
        } else {
            1
        }
    }

    /// Get the parsed table, mapping and parsing the file on first use.
    pub fn table(&self, type_: usize, paths: &[PathBuf]) -> Option<&TableData> {
        self.tables[type_]
            .get_or_init(|| {
                let name = format!("{}{}", self.acronym, SUFFIX[type_]);
                let mmap = map_table(paths, &name)?;
                self.parse(mmap, type_)
            })
            .as_ref()
    }

    /// Parse the mapped file into offsets and decoder state.
    fn parse(&self, mmap: Mmap, type_: usize) -> Option<TableData> {
        let data: &[u8] = &mmap;
        if data.len() < 5 || read_u32_le(data, 0) != MAGIC[type_] {
            log::warn!("corrupted tablebase file for {}", self.acronym);
            return None;
        }

        let wdl = type_ == WDL;
        let split = wdl && data[4] & 0x01 != 0;
        let num = self.num_tables(type_);
        let num_pieces = usize::from(self.num);
        let enc = if self.has_pawns { Enc::File } else { Enc::Piece };

        let ei_len = if wdl { 2 * num } else { num };
        let mut ei: Vec<EncInfo> = (0..ei_len).map(|_| EncInfo::empty()).collect();
        let mut tb_size = [[0usize; 2]; 4];
        let mut ptr = 5usize;

        let header_step =
            num_pieces + 1 + usize::from(self.has_pawns && self.pawns[1] > 0);
        for t in 0..num {
            tb_size[t][0] =
                ei[t].init(num_pieces, self.kk_enc, self.pawns, &data[ptr..], 0, t, enc);
            if split {
                tb_size[t][1] =
                    ei[num + t].init(num_pieces, self.kk_enc, self.pawns, &data[ptr..], 4, t, enc);
            }
            ptr += header_step;
        }
        ptr += ptr & 1;

        let mut sizes = [[[0usize; 3]; 2]; 4];
        let mut dtz_flags = [0u8; 4];
        for t in 0..num {
            let (d, flags, s) = pairs::setup_pairs(data, &mut ptr, tb_size[t][0], wdl);
            ei[t].precomp = d;
            sizes[t][0] = s;
            if type_ == DTZ {
                dtz_flags[t] = flags;
            }
            if split {
                let (d, _, s) = pairs::setup_pairs(data, &mut ptr, tb_size[t][1], wdl);
                ei[num + t].precomp = d;
                sizes[t][1] = s;
            }
        }

        // DTZ value maps
        let mut dtz_map = 0usize;
        let mut dtz_map_idx = [[0u16; 4]; 4];
        if type_ == DTZ {
            dtz_map = ptr;
            for t in 0..num {
                if dtz_flags[t] & 2 != 0 {
                    if dtz_flags[t] & 16 == 0 {
                        for i in 0..4 {
                            dtz_map_idx[t][i] = (ptr + 1 - dtz_map) as u16;
                            ptr += 1 + usize::from(data[ptr]);
                        }
                    } else {
                        ptr += ptr & 1;
                        for i in 0..4 {
                            dtz_map_idx[t][i] = ((ptr + 2 - dtz_map) / 2) as u16;
                            ptr += 2 + 2 * usize::from(read_u16_le(data, ptr));
                        }
                    }
                }
            }
            ptr += ptr & 1;
        }

        for t in 0..num {
            ei[t].precomp.idx_table = ptr;
            ptr += sizes[t][0][0];
            if split {
                ei[num + t].precomp.idx_table = ptr;
                ptr += sizes[t][1][0];
            }
        }
        for t in 0..num {
            ei[t].precomp.size_table = ptr;
            ptr += sizes[t][0][1];
            if split {
                ei[num + t].precomp.size_table = ptr;
                ptr += sizes[t][1][1];
            }
        }
        for t in 0..num {
            ptr = (ptr + 0x3f) & !0x3f;
            ei[t].precomp.data = ptr;
            ptr += sizes[t][0][2];
            if split {
                ptr = (ptr + 0x3f) & !0x3f;
                ei[num + t].precomp.data = ptr;
                ptr += sizes[t][1][2];
            }
        }

        if ptr > data.len() {
            log::warn!("truncated tablebase file for {}", self.acronym);
            return None;
        }

        Some(TableData {
            mmap,
            ei,
            split,
            dtz_flags,
            dtz_map,
            dtz_map_idx,
        })
    }
}

fn open_table(paths: &[PathBuf], name: &str) -> Option<File> {
    paths
        .iter()
        .find_map(|p| File::open(Path::new(p).join(name)).ok())
}

/// A table exists and has a plausible size (entries are 64-byte aligned
/// with a 16-byte header remainder).
pub fn test_table(paths: &[PathBuf], name: &str) -> bool {
    match open_table(paths, name).and_then(|f| f.metadata().ok()) {
        Some(meta) => {
            if meta.len() & 63 != 16 {
                log::warn!("incomplete tablebase file: {name}");
                false
            } else {
                true
            }
        }
        None => false,
    }
}

fn map_table(paths: &[PathBuf], name: &str) -> Option<Mmap> {
    let file = open_table(paths, name)?;
    match unsafe { Mmap::map(&file) } {
        Ok(mmap) => Some(mmap),
        Err(err) => {
            log::warn!("mapping tablebase {name} into memory failed: {err}");
            None
        }
    }
}
