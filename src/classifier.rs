use image::RgbImage;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use tracing::{debug, info};

use crate::cluster::KMeans;
use crate::config::ClassifierConfig;
use crate::detection::Team;
use crate::encoder::ImageEncoder;
use crate::error::{Error, Result};
use crate::reduction::Pca;

const TEAMS: usize = 2;

/// Fitted team model: reduction followed by two centroids.
///
/// Immutable once built; `predict` never changes it.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamModel {
    pca: Pca,
    kmeans: KMeans,
}

impl TeamModel {
    pub fn fit(embeddings: ArrayView2<'_, f32>, config: &ClassifierConfig) -> Result<Self> {
        if embeddings.nrows() == 0 {
            return Err(Error::EmptyFit);
        }

        let pca = Pca::fit(embeddings, config.components)?;
        let projected = pca.transform(embeddings)?;
        let kmeans = KMeans::fit(projected.view(), TEAMS, config.max_iter, config.seed)?;

        Ok(Self { pca, kmeans })
    }

    pub fn predict(&self, embeddings: ArrayView2<'_, f32>) -> Result<Vec<Team>> {
        let projected = self.pca.transform(embeddings)?;

        Ok(self
            .kmeans
            .predict_batch(projected.view())
            .into_iter()
            .map(Team::from_index)
            .collect())
    }

    #[inline]
    pub fn pca(&self) -> &Pca {
        &self.pca
    }

    #[inline]
    pub fn kmeans(&self) -> &KMeans {
        &self.kmeans
    }
}

/// Unsupervised two-team classifier over entity crops.
pub struct TeamClassifier<E> {
    encoder: E,
    config: ClassifierConfig,
    model: Option<TeamModel>,
}

impl<E: ImageEncoder> TeamClassifier<E> {
    pub fn new(encoder: E, config: ClassifierConfig) -> Self {
        Self {
            encoder,
            config,
            model: None,
        }
    }

    pub fn with_model(encoder: E, config: ClassifierConfig, model: TeamModel) -> Self {
        Self {
            encoder,
            config,
            model: Some(model),
        }
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    #[inline]
    pub fn model(&self) -> Option<&TeamModel> {
        self.model.as_ref()
    }

    #[inline]
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Embeds crops in chunks of `batch_size`, rows follow input order.
    pub fn extract_features(&self, crops: &[RgbImage]) -> Result<Array2<f32>> {
        let batch_size = self.config.batch_size.max(1);
        let mut parts = Vec::with_capacity((crops.len() + batch_size - 1) / batch_size);

        for batch in crops.chunks(batch_size) {
            let emb = self.encoder.embed(batch)?;

            if emb.nrows() != batch.len() {
                return Err(Error::Inference(format!(
                    "encoder returned {} rows for {} crops",
                    emb.nrows(),
                    batch.len()
                )));
            }

            parts.push(emb);
        }

        if parts.is_empty() {
            return Ok(Array2::zeros((0, self.encoder.dim())));
        }

        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();

        Ok(concatenate(Axis(0), &views)?)
    }

    /// Fits the team model on `crops`. The model is fixed once fitted, a
    /// second call fails with [`Error::AlreadyFitted`].
    pub fn fit(&mut self, crops: &[RgbImage]) -> Result<()> {
        if self.model.is_some() {
            return Err(Error::AlreadyFitted);
        }

        if crops.is_empty() {
            return Err(Error::EmptyFit);
        }

        let features = self.extract_features(crops)?;
        let model = TeamModel::fit(features.view(), &self.config)?;

        info!(samples = crops.len(), dim = features.ncols(), "team classifier fitted");
        self.model = Some(model);

        Ok(())
    }

    pub fn predict(&self, crops: &[RgbImage]) -> Result<Vec<Team>> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.as_ref().ok_or(Error::NotFitted)?;
        let features = self.extract_features(crops)?;
        let teams = model.predict(features.view())?;

        debug!(crops = crops.len(), "team labels predicted");

        Ok(teams)
    }
}
