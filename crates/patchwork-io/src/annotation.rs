//! Rasterizing ASAP polygon annotations into label masks.
//!
//! ASAP stores each annotated region as
//! `Annotation[@PartOfGroup]/Coordinates/Coordinate[@Order, @X, @Y]` in
//! level-0 pixel space. Groups map to label values through a
//! [`LabelMap`]; where regions of different groups overlap, the group
//! listed first wins.

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use imageproc::point::Point;
use patchwork_pipeline::Dimensions;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Errors raised while converting annotations.
#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    /// Reading the annotation file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The annotation file is not well-formed XML.
    #[error("malformed annotation XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// A coordinate attribute is missing or not a number.
    #[error("annotation {annotation}: bad coordinate {value:?}")]
    Coordinate {
        /// Name of the annotation holding the coordinate.
        annotation: String,
        /// Offending attribute text.
        value: String,
    },

    /// The slide header could not be read or the mask not encoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// One annotated polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// `Name` attribute.
    pub name: String,
    /// `PartOfGroup` attribute.
    pub group: String,
    /// Vertices in level-0 pixels, in `Order`.
    pub vertices: Vec<(f64, f64)>,
}

fn parse_coordinate(annotation: &str, value: Option<&str>) -> Result<f64, AnnotationError> {
    let bad = || AnnotationError::Coordinate {
        annotation: annotation.to_string(),
        value: value.unwrap_or_default().to_string(),
    };
    // Some exporters write a decimal comma.
    value
        .ok_or_else(bad)?
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| bad())
}

/// Parse every `Annotation` element of an ASAP document.
///
/// # Errors
///
/// Returns [`AnnotationError::Xml`] for malformed XML and
/// [`AnnotationError::Coordinate`] for unreadable vertices.
pub fn parse_annotations(xml: &str) -> Result<Vec<Annotation>, AnnotationError> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut annotations = Vec::new();
    for node in doc.descendants().filter(|n| n.has_tag_name("Annotation")) {
        let name = node.attribute("Name").unwrap_or_default().to_string();
        let group = node.attribute("PartOfGroup").unwrap_or_default().to_string();
        let mut ordered = Vec::new();
        for (position, coord) in node
            .descendants()
            .filter(|n| n.has_tag_name("Coordinate"))
            .enumerate()
        {
            let order = coord
                .attribute("Order")
                .and_then(|o| o.trim().parse::<usize>().ok())
                .unwrap_or(position);
            let x = parse_coordinate(&name, coord.attribute("X"))?;
            let y = parse_coordinate(&name, coord.attribute("Y"))?;
            ordered.push((order, (x, y)));
        }
        ordered.sort_by_key(|&(order, _)| order);
        annotations.push(Annotation {
            name,
            group,
            vertices: ordered.into_iter().map(|(_, v)| v).collect(),
        });
    }
    Ok(annotations)
}

/// Label value per annotation group, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    groups: Vec<(String, u8)>,
}

impl LabelMap {
    /// Build from `(group, label)` pairs, highest priority first.
    #[must_use]
    pub fn new(groups: impl IntoIterator<Item = (String, u8)>) -> Self {
        Self {
            groups: groups.into_iter().collect(),
        }
    }

    /// CAMELYON16 lesion annotations: groups `_0` and `_1` are tumor,
    /// `_2` marks normal tissue inside tumor regions.
    #[must_use]
    pub fn camelyon16() -> Self {
        Self::new([
            ("_0".to_string(), 1),
            ("_1".to_string(), 1),
            ("_2".to_string(), 0),
        ])
    }

    /// CAMELYON17 annotations: `metastases` = 1, `normal` = 2.
    #[must_use]
    pub fn camelyon17() -> Self {
        Self::new([("metastases".to_string(), 1), ("normal".to_string(), 2)])
    }

    /// Label of `group`, or `None` if the group is not drawn.
    #[must_use]
    pub fn label(&self, group: &str) -> Option<u8> {
        self.groups
            .iter()
            .find(|(g, _)| g == group)
            .map(|&(_, label)| label)
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::camelyon16()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_polygon(vertices: &[(f64, f64)]) -> Vec<Point<i32>> {
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(vertices.len());
    for &(x, y) in vertices {
        let p = Point::new(x.round() as i32, y.round() as i32);
        if poly.last() != Some(&p) {
            poly.push(p);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    poly
}

/// Paint annotations onto a blank mask of `size`.
///
/// Groups are painted from lowest to highest priority so the first
/// listed ends up on top. Groups missing from `labels` and polygons
/// with fewer than three distinct vertices are skipped.
#[must_use]
pub fn rasterize(annotations: &[Annotation], size: Dimensions, labels: &LabelMap) -> GrayImage {
    let mut mask = GrayImage::new(size.width, size.height);
    for (group, label) in labels.groups.iter().rev() {
        for annotation in annotations.iter().filter(|a| &a.group == group) {
            let polygon = to_polygon(&annotation.vertices);
            if polygon.len() < 3 {
                tracing::debug!(name = %annotation.name, "skipping degenerate polygon");
                continue;
            }
            imageproc::drawing::draw_polygon_mut(&mut mask, &polygon, Luma([*label]));
        }
    }
    mask
}

/// Convert one annotation file to a PNG label mask of `size`.
///
/// Returns the number of annotations read.
///
/// # Errors
///
/// Returns [`AnnotationError`] if the file cannot be read or parsed or
/// the mask cannot be written.
pub fn convert(
    annotations: &Path,
    output: &Path,
    size: Dimensions,
    labels: &LabelMap,
) -> Result<usize, AnnotationError> {
    let xml = std::fs::read_to_string(annotations)?;
    let parsed = parse_annotations(&xml)?;
    let mask = rasterize(&parsed, size, labels);
    mask.save_with_format(output, image::ImageFormat::Png)?;
    Ok(parsed.len())
}

/// One annotation file to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskJob {
    /// Shared stem.
    pub stem: String,
    /// ASAP XML file.
    pub annotations: PathBuf,
    /// Slide the mask must match in size.
    pub slide: PathBuf,
    /// PNG mask to write.
    pub output: PathBuf,
}

/// Pair annotation files with slides by stem; masks go to
/// `<out_dir>/<stem>.png`.
#[must_use]
pub fn mask_jobs(
    annotations: &std::collections::BTreeMap<String, PathBuf>,
    slides: &std::collections::BTreeMap<String, PathBuf>,
    out_dir: &Path,
) -> Vec<MaskJob> {
    annotations
        .iter()
        .filter_map(|(stem, xml)| {
            let slide = slides.get(stem)?;
            Some(MaskJob {
                stem: stem.clone(),
                annotations: xml.clone(),
                slide: slide.clone(),
                output: out_dir.join(format!("{stem}.png")),
            })
        })
        .collect()
}

fn run_job(job: &MaskJob, labels: &LabelMap) -> Result<usize, AnnotationError> {
    let (width, height) = image::image_dimensions(&job.slide)?;
    let count = convert(
        &job.annotations,
        &job.output,
        Dimensions::new(width, height),
        labels,
    )?;
    tracing::info!(slide = %job.stem, annotations = count, %width, %height, "wrote mask");
    Ok(count)
}

/// Convert every job on a pool of `threads` workers (0 = one per
/// core). Results come back in job order.
///
/// # Errors
///
/// Returns [`AnnotationError::Pool`] if the pool cannot be built.
/// Per-job failures are returned in the result list.
pub fn convert_all(
    jobs: &[MaskJob],
    labels: &LabelMap,
    threads: usize,
) -> Result<Vec<Result<usize, AnnotationError>>, AnnotationError> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    Ok(pool.install(|| jobs.par_iter().map(|job| run_job(job, labels)).collect()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const XML: &str = r##"<?xml version="1.0"?>
<ASAP_Annotations>
  <Annotations>
    <Annotation Name="Annotation 0" Type="Polygon" PartOfGroup="_0" Color="#F4FA58">
      <Coordinates>
        <Coordinate Order="1" X="30" Y="2" />
        <Coordinate Order="0" X="2" Y="2" />
        <Coordinate Order="2" X="30" Y="30" />
        <Coordinate Order="3" X="2" Y="30" />
      </Coordinates>
    </Annotation>
    <Annotation Name="Annotation 1" Type="Polygon" PartOfGroup="_2" Color="#64FE2E">
      <Coordinates>
        <Coordinate Order="0" X="10,0" Y="10" />
        <Coordinate Order="1" X="20" Y="10" />
        <Coordinate Order="2" X="20" Y="20" />
        <Coordinate Order="3" X="10" Y="20" />
      </Coordinates>
    </Annotation>
  </Annotations>
  <AnnotationGroups />
</ASAP_Annotations>"##;

    #[test]
    fn parses_groups_and_ordered_vertices() {
        let annotations = parse_annotations(XML).unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].group, "_0");
        assert_eq!(annotations[0].vertices[0], (2.0, 2.0));
        assert_eq!(annotations[0].vertices[1], (30.0, 2.0));
        assert_eq!(annotations[1].vertices[0], (10.0, 10.0));
        assert_eq!(LabelMap::camelyon16().label("_2"), Some(0));
        assert_eq!(LabelMap::camelyon16().label("_9"), None);
    }

    #[test]
    fn bad_coordinate_is_reported() {
        let xml = XML.replace("X=\"20\" Y=\"10\"", "X=\"abc\" Y=\"10\"");
        let err = parse_annotations(&xml).unwrap_err();
        assert!(matches!(err, AnnotationError::Coordinate { .. }));
    }

    #[test]
    fn malformed_xml_is_reported() {
        assert!(matches!(
            parse_annotations("<ASAP_Annotations>"),
            Err(AnnotationError::Xml(_))
        ));
    }

    #[test]
    fn first_listed_group_wins_overlap() {
        let annotations = parse_annotations(XML).unwrap();
        let mask = rasterize(&annotations, Dimensions::new(40, 40), &LabelMap::camelyon16());
        assert_eq!(mask.get_pixel(15, 15).0[0], 1);
        assert_eq!(mask.get_pixel(5, 5).0[0], 1);
        assert_eq!(mask.get_pixel(35, 35).0[0], 0);

        // With the exclusion group first it carves a hole.
        let carve = LabelMap::new([("_2".to_string(), 0), ("_0".to_string(), 1)]);
        let mask = rasterize(&annotations, Dimensions::new(40, 40), &carve);
        assert_eq!(mask.get_pixel(15, 15).0[0], 0);
        assert_eq!(mask.get_pixel(5, 5).0[0], 1);
    }

    #[test]
    fn unknown_groups_and_degenerate_polygons_are_skipped() {
        let annotations = vec![
            Annotation {
                name: "a".to_string(),
                group: "other".to_string(),
                vertices: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)],
            },
            Annotation {
                name: "b".to_string(),
                group: "_0".to_string(),
                vertices: vec![(1.0, 1.0), (5.0, 5.0), (1.0, 1.0)],
            },
        ];
        let mask = rasterize(&annotations, Dimensions::new(12, 12), &LabelMap::default());
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn closed_polygon_is_opened() {
        let poly = to_polygon(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 0.0)]);
        assert_eq!(poly.len(), 3);
    }

    #[test]
    fn convert_all_writes_masks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let slide = dir.path().join("tumor_001.png");
        GrayImage::new(40, 40).save(&slide).unwrap();
        let xml = dir.path().join("tumor_001.xml");
        std::fs::write(&xml, XML).unwrap();

        let annotations = [("tumor_001".to_string(), xml)].into_iter().collect();
        let slides = [
            ("tumor_001".to_string(), slide),
            ("tumor_002".to_string(), dir.path().join("tumor_002.png")),
        ]
        .into_iter()
        .collect();
        let out = dir.path().join("masks");
        std::fs::create_dir(&out).unwrap();
        let jobs = mask_jobs(&annotations, &slides, &out);
        assert_eq!(jobs.len(), 1);

        let results = convert_all(&jobs, &LabelMap::default(), 2).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(*results[0].as_ref().unwrap(), 2);
        let mask = image::open(out.join("tumor_001.png")).unwrap().to_luma8();
        assert_eq!(mask.dimensions(), (40, 40));
        assert_eq!(mask.get_pixel(15, 15).0[0], 1);
    }
}
