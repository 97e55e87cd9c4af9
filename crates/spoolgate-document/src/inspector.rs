// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job container inspector — page count and paper size from an XPS package.
//
// An XPS job is a zip archive with one `*.fpage` part per page.  Each page
// part is a `FixedPage` XML element whose `Width`/`Height` attributes give
// the page size in 1/96-inch units.  Inspection never fails from the
// caller's point of view: a container that cannot be read degrades to one
// page at the fallback paper size, and every cause is logged by name.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use spoolgate_core::types::{Inspection, PaperFallback, PaperSize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use zip::ZipArchive;

/// Suffix (lowercase) of page-description parts inside a container.
pub const PAGE_PART_SUFFIX: &str = ".fpage";

/// Known page geometries in 1/96-inch units (width, height).
const PAGE_SIZES: [((u32, u32), PaperSize); 5] = [
    ((816, 1056), PaperSize::Letter),
    ((559, 794), PaperSize::A5),
    ((794, 1123), PaperSize::A4),
    ((1587, 2245), PaperSize::A3),
    ((2245, 3175), PaperSize::A2),
];

/// Why a container (or its first page) could not be read.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a zip job container: {0}")]
    NotAContainer(#[from] zip::result::ZipError),

    #[error("cannot read page part {name}: {detail}")]
    PagePart { name: String, detail: String },

    #[error("malformed page XML in {name}: {detail}")]
    Xml { name: String, detail: String },

    #[error("page part {name} declares no usable Width/Height")]
    MissingGeometry { name: String },
}

/// Extracts page count and paper size from spooled job containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentInspector {
    fallback: PaperFallback,
}

impl DocumentInspector {
    pub fn new(fallback: PaperFallback) -> Self {
        Self { fallback }
    }

    /// Inspect a container, degrading to `{1 page, fallback paper}` on any
    /// container-level failure.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn inspect(&self, path: impl AsRef<Path>) -> Inspection {
        match self.try_inspect(path.as_ref()) {
            Ok(inspection) => inspection,
            Err(err) => {
                warn!(error = %err, "container unreadable, using default metadata");
                Inspection {
                    page_count: 1,
                    paper_size: self.fallback.paper_size(),
                    degraded: true,
                }
            }
        }
    }

    /// Inspect a container, reporting container-level failures.
    ///
    /// A readable container whose first page has unusable geometry still
    /// succeeds; its paper size is the fallback.
    pub fn try_inspect(&self, path: &Path) -> Result<Inspection, InspectError> {
        let file = File::open(path).map_err(|source| InspectError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.inspect_reader(BufReader::new(file))
    }

    /// Inspect a container from any seekable reader.
    pub fn inspect_reader<R: Read + Seek>(&self, reader: R) -> Result<Inspection, InspectError> {
        let mut archive = ZipArchive::new(reader)?;
        let pages = page_parts(&archive);
        debug!(pages = pages.len(), "page parts counted");

        let paper_size = match pages.first() {
            None => self.fallback.paper_size(),
            Some(first) => match page_geometry(&mut archive, first) {
                Ok(geometry) => self.classify(geometry),
                Err(err) => {
                    warn!(error = %err, "page geometry unreadable, using fallback paper size");
                    self.fallback.paper_size()
                }
            },
        };

        Ok(Inspection {
            page_count: u32::try_from(pages.len()).unwrap_or(u32::MAX),
            paper_size,
            degraded: false,
        })
    }

    /// Map a (width, height) pair in 1/96-inch units to a paper size.
    pub fn classify(&self, geometry: (u32, u32)) -> PaperSize {
        PAGE_SIZES
            .iter()
            .find(|(dims, _)| *dims == geometry)
            .map(|(_, size)| *size)
            .unwrap_or_else(|| {
                debug!(width = geometry.0, height = geometry.1, "unmatched page geometry");
                self.fallback.paper_size()
            })
    }
}

/// Names of page-description parts, in archive order.
fn page_parts<R: Read + Seek>(archive: &ZipArchive<R>) -> Vec<String> {
    (0..archive.len())
        .filter_map(|i| archive.name_for_index(i))
        .filter(|name| name.to_ascii_lowercase().ends_with(PAGE_PART_SUFFIX))
        .map(str::to_owned)
        .collect()
}

/// Read the root element's `Width`/`Height` of a page part, rounded to the
/// nearest unit.
fn page_geometry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<(u32, u32), InspectError> {
    let mut xml = Vec::new();
    archive
        .by_name(name)
        .map_err(|e| InspectError::PagePart {
            name: name.to_owned(),
            detail: e.to_string(),
        })?
        .read_to_end(&mut xml)
        .map_err(|e| InspectError::PagePart {
            name: name.to_owned(),
            detail: e.to_string(),
        })?;

    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref root)) | Ok(Event::Empty(ref root)) => {
                return root_geometry(root).ok_or_else(|| InspectError::MissingGeometry {
                    name: name.to_owned(),
                });
            }
            Ok(Event::Eof) => {
                return Err(InspectError::MissingGeometry {
                    name: name.to_owned(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                return Err(InspectError::Xml {
                    name: name.to_owned(),
                    detail: e.to_string(),
                });
            }
        }
        buf.clear();
    }
}

fn root_geometry(root: &BytesStart<'_>) -> Option<(u32, u32)> {
    let mut width = None;
    let mut height = None;
    for attr in root.attributes().flatten() {
        let target = match attr.key.local_name().as_ref() {
            b"Width" => &mut width,
            b"Height" => &mut height,
            _ => continue,
        };
        *target = std::str::from_utf8(&attr.value)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0 && *v < u32::MAX as f64)
            .map(|v| v.round() as u32);
    }
    Some((width?, height?))
}
