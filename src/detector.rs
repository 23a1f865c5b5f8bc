use image::{imageops, RgbImage};
use nalgebra as na;
use ndarray::prelude::*;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::bbox::{BBox, Ltrb, Xywh};
use crate::config::DetectionConfig;
use crate::detection::{Class, Detection, Detections};
use crate::error::{Error, Result};

const CXYWH_OFFSET: usize = 4;
const KPT_STEP: usize = 3;
const PAD_VALUE: f32 = 144.0 / 255.0;

/// Raw network runner, e.g. an ONNX session.
///
/// Takes an NCHW batch normalized to [0, 1] and returns the first output
/// tensor unchanged.
pub trait InferenceModel {
    /// Network input as `(width, height)`
    fn input_size(&self) -> (u32, u32);
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>>;
}

impl<M: InferenceModel + ?Sized> InferenceModel for Box<M> {
    #[inline]
    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    #[inline]
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        (**self).run(input)
    }
}

pub trait Detector {
    /// Detections of one frame with `confidence >= confidence`.
    fn infer(&mut self, frame: &RgbImage, confidence: f32) -> Result<Detections>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    #[inline]
    fn infer(&mut self, frame: &RgbImage, confidence: f32) -> Result<Detections> {
        (**self).infer(frame, confidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub xy: na::Point2<f32>,
    pub confidence: f32,
}

/// Field landmarks of one frame, positionally aligned with the pitch vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPoints {
    pub points: Vec<KeyPoint>,
}

impl KeyPoints {
    #[inline]
    pub fn new(points: Vec<KeyPoint>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `(index, point)` pairs with confidence strictly above `threshold`.
    pub fn confident(&self, threshold: f32) -> impl Iterator<Item = (usize, &KeyPoint)> {
        self.points
            .iter()
            .enumerate()
            .filter(move |(_, kp)| kp.confidence > threshold)
    }
}

pub trait KeypointSource {
    fn keypoints(&mut self, frame: &RgbImage) -> Result<KeyPoints>;
}

impl<K: KeypointSource + ?Sized> KeypointSource for Box<K> {
    #[inline]
    fn keypoints(&mut self, frame: &RgbImage) -> Result<KeyPoints> {
        (**self).keypoints(frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// Object detector, `[1, 4 + nc, N]` output
    Yolo,
    /// Pose model over field landmarks, `[1, 4 + 1 + 3K, N]` output
    Keypoints,
}

impl FromStr for DetectorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yolo" | "yolov8" | "ultralytics" => Ok(DetectorKind::Yolo),
            "yolo-pose" | "pose" | "keypoints" => Ok(DetectorKind::Keypoints),
            _ => Err(Error::UnknownDetectorKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct YoloDetectorConfig {
    /// Per-class suppression threshold
    pub iou_threshold: f32,
    /// Model output index -> class id; identity when `None`
    pub class_map: Option<Vec<i32>>,
    pub num_keypoints: usize,
    /// Minimum instance score for the pose model
    pub keypoint_box_confidence: f32,
}

impl Default for YoloDetectorConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.7,
            class_map: None,
            num_keypoints: 32,
            keypoint_box_confidence: 0.3,
        }
    }
}

impl From<&DetectionConfig> for YoloDetectorConfig {
    fn from(config: &DetectionConfig) -> Self {
        Self::new(config.class_iou)
    }
}

impl YoloDetectorConfig {
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            ..Default::default()
        }
    }

    #[inline]
    fn map_class(&self, index: usize) -> i32 {
        match &self.class_map {
            Some(map) => map.get(index).copied().unwrap_or(index as i32),
            None => index as i32,
        }
    }
}

/// Aspect preserving resize into the top-left corner of the network input.
///
/// Returns the input batch and the frame to input scale.
pub fn letterbox(frame: &RgbImage, input_size: (u32, u32)) -> (Array4<f32>, f32) {
    let (iw, ih) = input_size;
    let (fw, fh) = frame.dimensions();

    let mut input = Array4::from_elem((1, 3, ih as usize, iw as usize), PAD_VALUE);
    if fw == 0 || fh == 0 {
        return (input, 1.0);
    }

    let ratio = (iw as f32 / fw as f32).min(ih as f32 / fh as f32);
    let nw = ((fw as f32 * ratio).round() as u32).clamp(1, iw.max(1));
    let nh = ((fh as f32 * ratio).round() as u32).clamp(1, ih.max(1));

    let resized = imageops::resize(frame, nw, nh, imageops::FilterType::Triangle);
    for (x, y, px) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = px.0;

        input[[0, 0, y, x]] = r as f32 / 255.0;
        input[[0, 1, y, x]] = g as f32 / 255.0;
        input[[0, 2, y, x]] = b as f32 / 255.0;
    }

    (input, ratio)
}

fn run_model<M: InferenceModel>(model: &mut M, frame: &RgbImage) -> Result<(Array3<f32>, f32)> {
    let (input, ratio) = letterbox(frame, model.input_size());
    let output = model.run(input)?.into_dimensionality::<Ix3>()?;

    if output.shape()[0] == 0 {
        return Err(Error::Inference("model returned an empty batch".into()));
    }

    Ok((output, ratio))
}

/// Maps a `cx, cy, w, h` prediction in input pixels back to the frame.
fn unletterbox(pred: ArrayView1<'_, f32>, ratio: f32, frame: &RgbImage) -> BBox<Ltrb> {
    BBox::<Xywh>::xywh(
        pred[0] / ratio,
        pred[1] / ratio,
        pred[2] / ratio,
        pred[3] / ratio,
    )
    .as_ltrb()
    .clamp(frame.width(), frame.height())
}

pub struct YoloDetector<M> {
    model: M,
    config: YoloDetectorConfig,
}

impl<M: InferenceModel> YoloDetector<M> {
    pub fn new(model: M, config: YoloDetectorConfig) -> Self {
        Self { model, config }
    }

    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }

    fn postprocess(
        &self,
        output: ArrayView3<'_, f32>,
        ratio: f32,
        frame: &RgbImage,
        confidence: f32,
    ) -> Result<Vec<Detection>> {
        let rows = output.shape()[1];
        if rows <= CXYWH_OFFSET {
            return Err(Error::Inference(format!(
                "detector output has {} rows, expected 4 + classes",
                rows
            )));
        }

        let mut dets = Vec::new();

        for pred in output.index_axis(Axis(0), 0).axis_iter(Axis(1)) {
            let scores = pred.slice(s![CXYWH_OFFSET..]);

            let best = scores
                .iter()
                .copied()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max });

            let (index, score) = match best {
                Some(best) => best,
                None => continue,
            };

            if score < confidence {
                continue;
            }

            let class_id = self.config.map_class(index);
            let class = match Class::from_id(class_id) {
                Some(class) => class,
                None => {
                    warn!(class_id, "detection with unknown class id skipped");
                    continue;
                }
            };

            let bbox = unletterbox(pred.slice(s![..CXYWH_OFFSET]), ratio, frame);
            dets.push(Detection::new(bbox, class, score));
        }

        Ok(dets)
    }
}

impl<M: InferenceModel> Detector for YoloDetector<M> {
    fn infer(&mut self, frame: &RgbImage, confidence: f32) -> Result<Detections> {
        let (output, ratio) = run_model(&mut self.model, frame)?;
        let dets = self.postprocess(output.view(), ratio, frame, confidence)?;
        let raw = dets.len();

        let dets = Detections::new(0, dets).with_nms(self.config.iou_threshold, false);
        debug!(raw, kept = dets.len(), "objects detected");

        Ok(dets)
    }
}

/// Field landmark detector over a YOLO pose model.
pub struct KeypointDetector<M> {
    model: M,
    config: YoloDetectorConfig,
}

impl<M: InferenceModel> KeypointDetector<M> {
    pub fn new(model: M, config: YoloDetectorConfig) -> Self {
        Self { model, config }
    }

    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }

    fn postprocess(&self, output: ArrayView3<'_, f32>, ratio: f32, frame: &RgbImage) -> Result<KeyPoints> {
        let k = self.config.num_keypoints;
        let expected = CXYWH_OFFSET + 1 + KPT_STEP * k;

        if output.shape()[1] != expected {
            return Err(Error::Inference(format!(
                "pose output has {} rows, expected {} for {} keypoints",
                output.shape()[1],
                expected,
                k
            )));
        }

        let batch = output.index_axis(Axis(0), 0);
        let best = batch
            .axis_iter(Axis(1))
            .max_by(|a, b| a[CXYWH_OFFSET].total_cmp(&b[CXYWH_OFFSET]));

        let pred = match best {
            Some(pred) if pred[CXYWH_OFFSET] >= self.config.keypoint_box_confidence => pred,
            _ => {
                debug!("no field instance found");
                return Ok(KeyPoints::default());
            }
        };

        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let kpts = pred.slice(s![CXYWH_OFFSET + 1..]);
        let points = (0..k)
            .map(|i| KeyPoint {
                xy: na::Point2::new(
                    (kpts[KPT_STEP * i] / ratio).clamp(0.0, fw),
                    (kpts[KPT_STEP * i + 1] / ratio).clamp(0.0, fh),
                ),
                confidence: kpts[KPT_STEP * i + 2],
            })
            .collect();

        Ok(KeyPoints::new(points))
    }
}

impl<M: InferenceModel> KeypointSource for KeypointDetector<M> {
    fn keypoints(&mut self, frame: &RgbImage) -> Result<KeyPoints> {
        let (output, ratio) = run_model(&mut self.model, frame)?;

        self.postprocess(output.view(), ratio, frame)
    }
}

/// Detector selected by name at construction time.
pub enum DetectorBackend {
    Yolo(YoloDetector<Box<dyn InferenceModel>>),
    Keypoints(KeypointDetector<Box<dyn InferenceModel>>),
}

impl DetectorBackend {
    pub fn kind(&self) -> DetectorKind {
        match self {
            DetectorBackend::Yolo(_) => DetectorKind::Yolo,
            DetectorBackend::Keypoints(_) => DetectorKind::Keypoints,
        }
    }
}

impl Detector for DetectorBackend {
    fn infer(&mut self, frame: &RgbImage, confidence: f32) -> Result<Detections> {
        match self {
            DetectorBackend::Yolo(det) => det.infer(frame, confidence),
            DetectorBackend::Keypoints(_) => {
                Err(Error::Unsupported("keypoint backend does not produce detections"))
            }
        }
    }
}

impl KeypointSource for DetectorBackend {
    fn keypoints(&mut self, frame: &RgbImage) -> Result<KeyPoints> {
        match self {
            DetectorBackend::Keypoints(det) => det.keypoints(frame),
            DetectorBackend::Yolo(_) => {
                Err(Error::Unsupported("object backend does not produce keypoints"))
            }
        }
    }
}

pub fn build_detector(
    kind: &str,
    model: Box<dyn InferenceModel>,
    config: YoloDetectorConfig,
) -> Result<DetectorBackend> {
    let kind: DetectorKind = kind.parse()?;
    let (w, h) = model.input_size();

    info!(?kind, width = w, height = h, "detector backend created");

    Ok(match kind {
        DetectorKind::Yolo => DetectorBackend::Yolo(YoloDetector::new(model, config)),
        DetectorKind::Keypoints => DetectorBackend::Keypoints(KeypointDetector::new(model, config)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;

    struct CannedModel {
        size: (u32, u32),
        output: ArrayD<f32>,
        last_input: Option<Vec<usize>>,
    }

    impl CannedModel {
        fn new(size: (u32, u32), output: ArrayD<f32>) -> Self {
            Self {
                size,
                output,
                last_input: None,
            }
        }
    }

    impl InferenceModel for CannedModel {
        fn input_size(&self) -> (u32, u32) {
            self.size
        }

        fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
            self.last_input = Some(input.shape().to_vec());
            Ok(self.output.clone())
        }
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(1280, 720, Rgb([30, 120, 30]))
    }

    // columns: ball, weak player, out-of-range class, referee
    fn object_output() -> ArrayD<f32> {
        let mut out = Array3::<f32>::zeros((1, 8, 4));
        let cols = [
            ([100.0, 100.0, 10.0, 10.0], 0, 0.9),
            ([200.0, 200.0, 20.0, 40.0], 2, 0.2),
            ([300.0, 200.0, 20.0, 40.0], 3, 0.8),
            ([400.0, 200.0, 20.0, 40.0], 1, 0.6),
        ];

        for (n, (b, class, score)) in cols.iter().enumerate() {
            for i in 0..4 {
                out[[0, i, n]] = b[i];
            }
            out[[0, 4 + class, n]] = *score;
        }

        out.into_dyn()
    }

    #[test]
    fn kind_names() {
        assert_eq!("yolov8".parse::<DetectorKind>().unwrap(), DetectorKind::Yolo);
        assert_eq!("Ultralytics".parse::<DetectorKind>().unwrap(), DetectorKind::Yolo);
        assert_eq!("pose".parse::<DetectorKind>().unwrap(), DetectorKind::Keypoints);
        assert!(matches!(
            "detr".parse::<DetectorKind>(),
            Err(Error::UnknownDetectorKind(name)) if name == "detr"
        ));
    }

    #[test]
    fn unknown_backend_fails_at_construction() {
        let model = CannedModel::new((640, 640), object_output());
        let res = build_detector("rcnn", Box::new(model), YoloDetectorConfig::default());

        assert!(matches!(res, Err(Error::UnknownDetectorKind(_))));
    }

    #[test]
    fn letterbox_keeps_aspect() {
        let (input, ratio) = letterbox(&frame(), (640, 640));

        assert_eq!(input.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(ratio, 0.5);
        assert_relative_eq!(input[[0, 1, 10, 10]], 120.0 / 255.0, epsilon = 1e-3);
        assert_relative_eq!(input[[0, 1, 600, 10]], PAD_VALUE);
    }

    #[test]
    fn decodes_boxes_in_frame_pixels() {
        let config = YoloDetectorConfig {
            class_map: Some(vec![0, 1, 2, 7]),
            ..YoloDetectorConfig::default()
        };
        let mut det = YoloDetector::new(CannedModel::new((640, 640), object_output()), config);

        let dets = det.infer(&frame(), 0.3).unwrap();
        assert_eq!(det.model().last_input, Some(vec![1, 3, 640, 640]));

        assert_eq!(dets.len(), 2);
        assert_eq!(dets.detections[0].class, Class::Ball);
        assert_eq!(dets.detections[0].bbox.as_slice(), &[190.0, 190.0, 210.0, 210.0]);
        assert_eq!(dets.detections[1].class, Class::Goalkeeper);
        assert!(dets.iter().all(|d| d.confidence >= 0.3));
    }

    #[test]
    fn class_iou_drives_per_class_suppression() {
        // two players, IoU 1/3
        let mut out = Array3::<f32>::zeros((1, 8, 2));
        for (n, (cx, score)) in [(200.0, 0.9), (210.0, 0.8)].iter().enumerate() {
            out[[0, 0, n]] = *cx;
            out[[0, 1, n]] = 200.0;
            out[[0, 2, n]] = 20.0;
            out[[0, 3, n]] = 40.0;
            out[[0, 6, n]] = *score;
        }

        let strict = DetectionConfig {
            class_iou: 0.3,
            ..DetectionConfig::default()
        };
        let mut det = build_detector(
            "yolo",
            Box::new(CannedModel::new((640, 640), out.clone().into_dyn())),
            YoloDetectorConfig::from(&strict),
        )
        .unwrap();
        let kept = det.infer(&frame(), 0.3).unwrap();
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept.detections[0].confidence, 0.9);

        let mut det = build_detector(
            "yolo",
            Box::new(CannedModel::new((640, 640), out.into_dyn())),
            YoloDetectorConfig::from(&DetectionConfig::default()),
        )
        .unwrap();
        assert_eq!(det.infer(&frame(), 0.3).unwrap().len(), 2);
    }

    #[test]
    fn backends_reject_foreign_capability() {
        let mut yolo = build_detector(
            "yolo",
            Box::new(CannedModel::new((640, 640), object_output())),
            YoloDetectorConfig::default(),
        )
        .unwrap();

        assert_eq!(yolo.kind(), DetectorKind::Yolo);
        assert!(matches!(yolo.keypoints(&frame()), Err(Error::Unsupported(_))));
        assert_eq!(yolo.infer(&frame(), 0.3).unwrap().len(), 3);
    }

    #[test]
    fn decodes_best_pose_instance() {
        let k = 4;
        let mut out = Array3::<f32>::zeros((1, 5 + 3 * k, 2));
        out[[0, 4, 0]] = 0.4;
        out[[0, 4, 1]] = 0.9;
        for i in 0..k {
            out[[0, 5 + 3 * i, 1]] = 100.0 * (i + 1) as f32;
            out[[0, 5 + 3 * i + 1, 1]] = 50.0;
            out[[0, 5 + 3 * i + 2, 1]] = if i == 2 { 0.1 } else { 0.95 };
        }

        let config = YoloDetectorConfig {
            num_keypoints: k,
            ..YoloDetectorConfig::default()
        };
        let mut det = KeypointDetector::new(CannedModel::new((640, 640), out.into_dyn()), config);

        let kps = det.keypoints(&frame()).unwrap();
        assert_eq!(kps.len(), 4);
        assert_eq!(kps.points[1].xy, na::Point2::new(400.0, 100.0));
        assert_eq!(kps.confident(0.5).map(|(i, _)| i).collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn weak_pose_instance_gives_no_keypoints() {
        let mut out = Array3::<f32>::zeros((1, 5 + 3 * 32, 1));
        out[[0, 4, 0]] = 0.1;

        let mut det = KeypointDetector::new(
            CannedModel::new((640, 640), out.into_dyn()),
            YoloDetectorConfig::default(),
        );
        assert!(det.keypoints(&frame()).unwrap().is_empty());
    }

    #[test]
    fn malformed_pose_output_is_an_error() {
        let out = Array3::<f32>::zeros((1, 9, 1)).into_dyn();
        let mut det = KeypointDetector::new(CannedModel::new((640, 640), out), YoloDetectorConfig::default());

        assert!(matches!(det.keypoints(&frame()), Err(Error::Inference(_))));
    }
}
