use anyhow::{Context, Result};
#[cfg(feature = "detailed_tracing")]
use log::trace;
use log::{debug, info};

use crate::config::Config;
use crate::here;
#[cfg(feature = "compression_stats")]
use crate::metrics::CodingStats;

use super::adaptive_prediction::AdaptivePrediction;
use super::basic_parameter::BasicParameterMap;
use super::context_parameter::ContextParameterMap;
use super::example_search::ExampleSearch;
use super::image::Image;
use super::mixture_distribution::MixtureDistribution;
use super::model_parameter::{select_unit, ModelParameterMap, ModelParameterUnit, PRE};
use super::optimizer::Optimizer;
use super::point::Point;
use super::range_coder::{FreqTable, RangeDecoder, RangeEncoder, UniformDistribution};
use super::template_patch::TemplatePatch;

/// Header fields, uniform-coded at the start of every bitstream. Image
/// dimensions are self-describing; `num_dists` is the shared capacity of
/// every pixel's merged example-search/adaptive-prediction candidate
/// list; `template_radius` sizes both the example-search template and
/// the context-feature template; `num_units` is the number of
/// `ModelParameterUnit`s (context buckets).
struct Header {
    width: u32,
    height: u32,
    num_dists: u32,
    template_radius: u32,
    num_units: u32,
}

impl Header {
    fn write(&self, enc: &mut RangeEncoder) {
        enc.encode(self.width - 1, &UniformDistribution::new(1 << 16));
        enc.encode(self.height - 1, &UniformDistribution::new(1 << 16));
        enc.encode(self.num_dists - 1, &UniformDistribution::new(1 << 8));
        enc.encode(self.template_radius - 1, &UniformDistribution::new(1 << 4));
        enc.encode(self.num_units - 1, &UniformDistribution::new(1 << 4));
    }

    fn read(dec: &mut RangeDecoder) -> Result<Header> {
        let width = dec.decode(&UniformDistribution::new(1 << 16)).context(here!())? + 1;
        let height = dec.decode(&UniformDistribution::new(1 << 16)).context(here!())? + 1;
        let num_dists = dec.decode(&UniformDistribution::new(1 << 8)).context(here!())? + 1;
        let template_radius = dec.decode(&UniformDistribution::new(1 << 4)).context(here!())? + 1;
        let num_units = dec.decode(&UniformDistribution::new(1 << 4)).context(here!())? + 1;
        Ok(Header {
            width,
            height,
            num_dists,
            template_radius,
            num_units,
        })
    }
}

fn write_unit_params(enc: &mut RangeEncoder, model_map: &ModelParameterMap) {
    let index_model = UniformDistribution::new(PRE);
    let has_pix_model = UniformDistribution::new(2);

    for unit_id in 0..model_map.num_units() {
        let has_pix = model_map.num_pix(unit_id) > 0;
        enc.encode(has_pix as u32, &has_pix_model);

        let quantized = model_map.unit(unit_id).quantize();
        for idx in quantized {
            enc.encode(idx, &index_model);
        }
    }
}

fn read_unit_params(dec: &mut RangeDecoder, num_units: usize) -> Result<ModelParameterMap> {
    let index_model = UniformDistribution::new(PRE);
    let has_pix_model = UniformDistribution::new(2);

    let mut model_map = ModelParameterMap::new(0, num_units);
    for unit_id in 0..num_units {
        let _has_pix = dec.decode(&has_pix_model).context(here!())?;

        let mut quantized = [0u32; super::model_parameter::NUM_MODEL_PARAMETERS];
        for slot in quantized.iter_mut() {
            *slot = dec.decode(&index_model).context(here!())?;
        }
        model_map.unit_mut(unit_id).a = ModelParameterUnit::restore(&quantized).a;
    }
    Ok(model_map)
}

/// Runs the offline estimator + BFGS/DFP fitting pass that only the
/// encoder can perform (it needs every pixel's true value). Returns the
/// fitted `ModelParameterMap`, one entry per context unit.
fn fit_model_parameters(
    image: &Image<u8>,
    config: &Config,
    feature_template: &TemplatePatch,
) -> ModelParameterMap {
    let width = image.width();
    let height = image.height();
    let num_pixels = (width as usize) * (height as usize);
    let num_dists = (config.ex_num + config.pr_num).max(1) as usize;

    let example_search = ExampleSearch::new(config.tp_rad as i32, config.tp_rad as f64);
    let adaptive = AdaptivePrediction::new(1.0);
    let basic_map = BasicParameterMap::new(width, height, num_dists);

    for y in 0..height {
        for x in 0..width {
            let p = Point::new(x, y);
            example_search.estimate(image, &basic_map, p, config.ex_win as i32, config.tp_wgt);
            adaptive.estimate(image, &basic_map, p, config.pr_win as i32);
        }
    }

    let mut candidates = Vec::with_capacity(num_pixels);
    for y in 0..height {
        for x in 0..width {
            candidates.push(basic_map.unit(Point::new(x, y)).params());
        }
    }

    let targets: Vec<u8> = image.as_slice().to_vec();

    let mut model_map = ModelParameterMap::new(num_pixels, config.cs_num as usize);
    let mut context_map = ContextParameterMap::new(width, height);

    let final_cost = {
        let mut optimizer = Optimizer::new(
            &mut model_map,
            &mut context_map,
            &candidates,
            &targets,
            feature_template,
            width,
            height,
        );
        optimizer.optimize()
    };

    debug!("optimizer converged, total cost = {:.1} bits", final_cost);

    model_map
}

/// Runs the single deterministic causal raster-scan pass shared by
/// encoder and decoder: both sides derive the per-pixel context feature
/// from already-coded neighbors, pick a unit by the pure formula in
/// `select_unit`, build the per-pixel mixture distribution from that
/// unit's (already known, transmitted) parameters, and code one symbol.
///
/// This intentionally does *not* reuse `ModelParameterMap`'s mutable
/// assignment bookkeeping (`set_unit`/`num_pix`) — that bookkeeping only
/// matters to the offline optimizer, which needs to know which pixels'
/// true values count toward a unit's fit. The coding pass itself only
/// ever needs the stateless feature-to-unit formula, which both encoder
/// and decoder can evaluate identically from causal information alone.
struct CausalCodingPass<'a> {
    model_map: &'a ModelParameterMap,
    context_map: ContextParameterMap,
    basic_map: BasicParameterMap,
    example_search: ExampleSearch,
    adaptive: AdaptivePrediction,
    feature_template: TemplatePatch,
    config: &'a Config,
    width: i32,
    height: i32,
}

impl<'a> CausalCodingPass<'a> {
    fn new(model_map: &'a ModelParameterMap, config: &'a Config, header: &Header) -> Self {
        let width = header.width as i32;
        let height = header.height as i32;
        CausalCodingPass {
            model_map,
            context_map: ContextParameterMap::new(width, height),
            basic_map: BasicParameterMap::new(width, height, header.num_dists as usize),
            example_search: ExampleSearch::new(header.template_radius as i32, header.template_radius as f64),
            adaptive: AdaptivePrediction::new(1.0),
            feature_template: TemplatePatch::diamond(header.template_radius as i32, header.template_radius as f64),
            config,
            width,
            height,
        }
    }

    fn distribution_for(&mut self, image: &Image<u8>, p: Point) -> MixtureDistribution {
        self.example_search
            .estimate(image, &self.basic_map, p, self.config.ex_win as i32, self.config.tp_wgt);
        self.adaptive.estimate(image, &self.basic_map, p, self.config.pr_win as i32);
        let candidates = self.basic_map.unit(p).params();

        self.context_map.update_feature(p, &self.feature_template);
        let feature = self.context_map.get(p).feature;
        let unit_id = select_unit(feature, self.model_map.num_units());
        let a = self.model_map.unit(unit_id).a;

        MixtureDistribution::new(&a, &candidates)
    }

    fn record_entropy(&mut self, p: Point, probability: f64) {
        self.context_map.set_entropy(p, -probability.log2());
    }
}

/// Encodes `image` into a self-contained bitstream.
pub fn encode(image: &Image<u8>, config: &Config) -> Result<Vec<u8>> {
    let width = image.width();
    let height = image.height();
    assert!(width > 0 && height > 0);

    let feature_template = TemplatePatch::diamond(config.tp_rad as i32, config.tp_rad as f64);
    let model_map = fit_model_parameters(image, config, &feature_template);

    let header = Header {
        width: width as u32,
        height: height as u32,
        num_dists: (config.ex_num + config.pr_num).max(1),
        template_radius: config.tp_rad,
        num_units: config.cs_num,
    };

    let mut enc = RangeEncoder::new();
    header.write(&mut enc);
    write_unit_params(&mut enc, &model_map);

    let mut pass = CausalCodingPass::new(&model_map, config, &header);
    #[cfg(feature = "compression_stats")]
    let mut stats = CodingStats::default();

    for y in 0..height {
        for x in 0..width {
            let p = Point::new(x, y);
            let symbol = *image.get(p);

            let dist = pass.distribution_for(image, p);
            let hist = dist.as_histogram();
            let freq_table = FreqTable::new(&hist);

            enc.encode(symbol as u32, &freq_table);
            let probability = dist.probability(symbol);
            pass.record_entropy(p, probability);

            #[cfg(feature = "compression_stats")]
            {
                stats.image_bits += -probability.log2();
            }
            #[cfg(feature = "detailed_tracing")]
            trace!("encode ({x},{y}): symbol={symbol} p={probability:.6}");
        }
    }

    let bytes = enc.finish();

    #[cfg(feature = "compression_stats")]
    info!(
        "encoded {}x{} image into {} bytes ({:.2} bits/pixel estimate, {:.2} total bits)",
        width,
        height,
        bytes.len(),
        stats.image_bits / ((width as f64) * (height as f64)),
        stats.total_bits()
    );
    #[cfg(not(feature = "compression_stats"))]
    info!("encoded {}x{} image into {} bytes", width, height, bytes.len());

    Ok(bytes)
}

/// Decodes a bitstream produced by `encode` back into an `Image<u8>`.
pub fn decode(bitstream: &[u8], config: &Config) -> Result<Image<u8>> {
    let mut dec = RangeDecoder::start(bitstream).context(here!())?;
    let header = Header::read(&mut dec).context(here!())?;

    if header.width == 0 || header.height == 0 {
        return crate::helpers::err_exit_code(
            crate::error::PmoExitCode::InvalidInput,
            "decoded header has zero-sized image",
        );
    }

    let model_map = read_unit_params(&mut dec, header.num_units as usize).context(here!())?;

    let width = header.width as i32;
    let height = header.height as i32;
    let mut image: Image<u8> = Image::new(width, height);

    let mut pass = CausalCodingPass::new(&model_map, config, &header);

    for y in 0..height {
        for x in 0..width {
            let p = Point::new(x, y);

            let dist = pass.distribution_for(&image, p);
            let hist = dist.as_histogram();
            let freq_table = FreqTable::new(&hist);

            let symbol = dec.decode(&freq_table).context(here!())?;
            image.set(p, symbol as u8);
            pass.record_entropy(p, dist.probability(symbol as u8));

            #[cfg(feature = "detailed_tracing")]
            trace!("decode ({x},{y}): symbol={symbol}");
        }
    }

    Ok(image)
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_config() -> Config {
        Config {
            ex_win: 8,
            ex_num: 4,
            pr_win: 6,
            pr_num: 4,
            cs_num: 2,
            tp_rad: 2,
            tp_wgt: 0.03,
            ..Config::default()
        }
    }

    #[test]
    fn test_roundtrip_uniform_image() {
        let image: Image<u8> = Image::from_vec(4, 4, vec![128u8; 16]);
        let config = test_config();

        let bytes = encode(&image, &config).unwrap();
        let decoded = decode(&bytes, &config).unwrap();

        assert_eq!(decoded.as_slice(), image.as_slice());
    }

    #[test]
    fn test_roundtrip_gradient_image() {
        let mut data = vec![0u8; 64];
        for y in 0..8i32 {
            for x in 0..8i32 {
                data[(y * 8 + x) as usize] = ((x * 16 + y * 8) % 256) as u8;
            }
        }
        let image = Image::from_vec(8, 8, data);
        let config = test_config();

        let bytes = encode(&image, &config).unwrap();
        let decoded = decode(&bytes, &config).unwrap();

        assert_eq!(decoded.as_slice(), image.as_slice());
    }

    #[test]
    fn test_roundtrip_random_noise_image() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let data: Vec<u8> = (0..256).map(|_| rng.gen()).collect();
        let image = Image::from_vec(16, 16, data);
        let config = test_config();

        let bytes = encode(&image, &config).unwrap();
        let decoded = decode(&bytes, &config).unwrap();

        assert_eq!(decoded.as_slice(), image.as_slice());
    }
}
