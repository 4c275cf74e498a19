use anyhow::{anyhow, bail, Context, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;
use std::path::Path;

use crate::embed::EmbeddingProvider;

// ---------------------------------------------------------------------------
// Config (defaults are all-MiniLM-L6-v2; any BERT-style config.json works)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BertConfig {
    pub hidden_size: usize,
    pub intermediate_size: usize,
    pub num_attention_heads: usize,
    pub num_hidden_layers: usize,
    pub vocab_size: usize,
    pub max_position_embeddings: usize,
    pub type_vocab_size: usize,
    pub layer_norm_eps: f64,
}

impl Default for BertConfig {
    fn default() -> Self {
        Self {
            hidden_size: 384,
            intermediate_size: 1536,
            num_attention_heads: 12,
            num_hidden_layers: 6,
            vocab_size: 30522,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        }
    }
}

impl BertConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read model config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw).context("parse model config json")?;
        if config.num_attention_heads == 0 || config.hidden_size % config.num_attention_heads != 0
        {
            bail!(
                "hidden_size {} is not divisible by num_attention_heads {}",
                config.hidden_size,
                config.num_attention_heads
            );
        }
        Ok(config)
    }

    fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

// ---------------------------------------------------------------------------
// Encoder layer: self-attention and feed-forward, each with residual + post-norm
// ---------------------------------------------------------------------------

struct EncoderLayer {
    query: Linear,
    key: Linear,
    value: Linear,
    attn_out: Linear,
    attn_norm: LayerNorm,
    ffn_up: Linear,
    ffn_down: Linear,
    ffn_norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl EncoderLayer {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let h = config.hidden_size;
        let attn = vb.pp("attention");
        let self_attn = attn.pp("self");

        Ok(Self {
            query: candle_nn::linear(h, h, self_attn.pp("query"))?,
            key: candle_nn::linear(h, h, self_attn.pp("key"))?,
            value: candle_nn::linear(h, h, self_attn.pp("value"))?,
            attn_out: candle_nn::linear(h, h, attn.pp("output").pp("dense"))?,
            attn_norm: candle_nn::layer_norm(
                h,
                config.layer_norm_eps,
                attn.pp("output").pp("LayerNorm"),
            )?,
            ffn_up: candle_nn::linear(h, config.intermediate_size, vb.pp("intermediate").pp("dense"))?,
            ffn_down: candle_nn::linear(config.intermediate_size, h, vb.pp("output").pp("dense"))?,
            ffn_norm: candle_nn::layer_norm(
                h,
                config.layer_norm_eps,
                vb.pp("output").pp("LayerNorm"),
            )?,
            num_heads: config.num_attention_heads,
            head_dim: config.head_dim(),
        })
    }

    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = x.dims3()?;
        Ok(x.reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// `x`: (batch, seq, hidden). `attn_bias`: (batch, 1, 1, seq), zero for
    /// real tokens and a large negative value for padding.
    fn forward(&self, x: &Tensor, attn_bias: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, hidden) = x.dims3()?;

        let q = self.split_heads(&self.query.forward(x)?)?;
        let k = self.split_heads(&self.key.forward(x)?)?;
        let v = self.split_heads(&self.value.forward(x)?)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = q
            .matmul(&k.t()?.contiguous()?)?
            .affine(scale, 0.0)?
            .broadcast_add(attn_bias)?;
        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, hidden))?;

        let x = self.attn_norm.forward(&(x + self.attn_out.forward(&context)?)?)?;
        let ffn = self.ffn_down.forward(&self.ffn_up.forward(&x)?.gelu_erf()?)?;
        Ok(self.ffn_norm.forward(&(x + ffn)?)?)
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

struct BertEncoder {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    token_type_embeddings: Embedding,
    embedding_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    device: Device,
}

impl BertEncoder {
    fn load(path: &Path, config: &BertConfig, device: &Device) -> Result<Self> {
        // SAFETY: the weights file is mapped read-only and not modified while loaded.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };
        let h = config.hidden_size;

        let emb = vb.pp("embeddings");
        let word_embeddings = candle_nn::embedding(config.vocab_size, h, emb.pp("word_embeddings"))?;
        let position_embeddings = candle_nn::embedding(
            config.max_position_embeddings,
            h,
            emb.pp("position_embeddings"),
        )?;
        let token_type_embeddings =
            candle_nn::embedding(config.type_vocab_size, h, emb.pp("token_type_embeddings"))?;
        let embedding_norm = candle_nn::layer_norm(h, config.layer_norm_eps, emb.pp("LayerNorm"))?;

        let layers = (0..config.num_hidden_layers)
            .map(|i| EncoderLayer::load(vb.pp("encoder").pp("layer").pp(i.to_string()), config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            word_embeddings,
            position_embeddings,
            token_type_embeddings,
            embedding_norm,
            layers,
            device: device.clone(),
        })
    }

    /// Mean-pooled, L2-normalized sentence vectors for a padded batch.
    fn encode(&self, ids: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let batch = ids.len();
        let seq_len = ids.iter().map(Vec::len).max().unwrap_or(0);
        if batch == 0 || seq_len == 0 {
            return Ok(vec![Vec::new(); batch]);
        }

        let mut flat_ids = Vec::with_capacity(batch * seq_len);
        let mut flat_mask = Vec::with_capacity(batch * seq_len);
        for row in ids {
            flat_ids.extend(row.iter().copied());
            flat_ids.extend(std::iter::repeat(0u32).take(seq_len - row.len()));
            flat_mask.extend(std::iter::repeat(1.0f32).take(row.len()));
            flat_mask.extend(std::iter::repeat(0.0f32).take(seq_len - row.len()));
        }

        let input_ids = Tensor::from_vec(flat_ids, (batch, seq_len), &self.device)?;
        let mask = Tensor::from_vec(flat_mask, (batch, seq_len), &self.device)?;
        let positions = Tensor::arange(0u32, seq_len as u32, &self.device)?;
        let token_types = Tensor::zeros((batch, seq_len), DType::U32, &self.device)?;

        let mut hidden = self
            .word_embeddings
            .forward(&input_ids)?
            .broadcast_add(&self.position_embeddings.forward(&positions)?)?
            .add(&self.token_type_embeddings.forward(&token_types)?)?;
        hidden = self.embedding_norm.forward(&hidden)?;

        let attn_bias = mask
            .affine(10_000.0, -10_000.0)?
            .unsqueeze(1)?
            .unsqueeze(1)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &attn_bias)?;
        }

        // Masked mean pooling + L2 normalize
        let mask = mask.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.maximum(1e-9)?;
        let pooled = summed.broadcast_div(&counts)?;
        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(1e-12)?;
        Ok(pooled.broadcast_div(&norms)?.to_vec2::<f32>()?)
    }
}

// ---------------------------------------------------------------------------
// Public MiniLmEmbeddingProvider
// ---------------------------------------------------------------------------

pub struct MiniLmEmbeddingProvider {
    encoder: BertEncoder,
    tokenizer: tokenizers::Tokenizer,
    max_tokens: usize,
}

impl MiniLmEmbeddingProvider {
    /// Load safetensors weights and a tokenizer. A `config.json` next to the
    /// weights is used when present; otherwise all-MiniLM-L6-v2 shapes apply.
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let sibling = model_path.with_file_name("config.json");
        let config = if sibling.exists() {
            BertConfig::load(&sibling)?
        } else {
            BertConfig::default()
        };
        Self::load_with_config(model_path, tokenizer_path, config)
    }

    pub fn load_with_config(
        model_path: &Path,
        tokenizer_path: &Path,
        config: BertConfig,
    ) -> Result<Self> {
        let device = Device::Cpu;
        let encoder = BertEncoder::load(model_path, &config, &device)
            .with_context(|| format!("load weights {}", model_path.display()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("load tokenizer: {e}"))?;

        Ok(Self {
            encoder,
            tokenizer,
            max_tokens: config.max_position_embeddings,
        })
    }

    fn token_ids(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenize: {e}"))?;
        let mut ids = encoding.get_ids().to_vec();
        ids.truncate(self.max_tokens);
        Ok(ids)
    }
}

impl EmbeddingProvider for MiniLmEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let ids = self.token_ids(text)?;
        self.encoder
            .encode(&[ids])?
            .pop()
            .ok_or_else(|| anyhow!("encoder returned no embedding"))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let ids = texts
            .iter()
            .map(|t| self.token_ids(t))
            .collect::<Result<Vec<_>>>()?;
        self.encoder.encode(&ids)
    }
}
