use std::path::PathBuf;
use thiserror::Error;

/// クレート全体で使うエラー型。
#[derive(Error, Debug)]
pub enum PinnError {
    /// 学習開始前に検出される設定の不備（幅ゼロの領域、空のバッチなど）。
    #[error("設定が不正です: {0}")]
    DegenerateInput(String),

    /// 非有限値（NaN/Inf）が連続して発生し、学習を打ち切ったことを表します。
    #[error("エポック {epoch} で数値が不安定になりました（{consecutive} エポック連続で非有限値）")]
    NumericInstability { epoch: usize, consecutive: usize },

    /// 学習が一度も有限な損失を記録しなかったため、復元できるモデルがありません。
    #[error("有限な損失が一度も記録されなかったため、最良モデルがありません")]
    NoFiniteSnapshot,

    #[error("パラメータの形状が一致しません: {0}")]
    ShapeMismatch(String),

    #[error("テンソルデータの変換に失敗しました: {0}")]
    Data(String),

    #[error("設定ファイル '{path}' を読み込めません: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("設定ファイルの解析に失敗しました: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("設定のシリアライズに失敗しました: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, PinnError>;
