//! Built-in templates seeded on first run.

use super::PromptTemplate;

/// Multi-image transcription into one TeX Sauce code block.
const TEX_SAUCE_CONVERSION: &str = r"以下の複数の数式画像（1枚または複数枚）をすべて分析し、それらを順に結合して、ひとつのTeX Sauce形式のコードブロックを作成してください。
画像が複数ある場合は、画像1, 画像2...の内容を順番に出力してください。
出力はコードブロックのみを含めてください。解説は不要です。

フォーマット例:
```texsauce
\begin{document}
% 画像1の内容
...
% 画像2の内容
...
\end{document}
```";

/// Japanese explanation of the formula in the image.
const FORMULA_EXPLANATION_JA: &str = "この画像の数式について、日本語で詳しく解説してください。
数式の意味、変数の定義、もしあれば解法の手順なども含めてください。";

/// The two templates a fresh install starts with.
pub fn default_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new("default-1", "TeX Sauce 変換", TEX_SAUCE_CONVERSION),
        PromptTemplate::new("default-2", "数式解説 (日本語)", FORMULA_EXPLANATION_JA),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_two_defaults_with_stable_ids() {
        let defaults = default_templates();
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults[0].id, "default-1");
        assert_eq!(defaults[1].id, "default-2");
    }

    #[test]
    fn conversion_prompt_shows_fenced_example() {
        let defaults = default_templates();
        assert!(defaults[0].content.contains("```texsauce"));
        assert!(defaults[0].content.contains(r"\begin{document}"));
        assert!(defaults[0].content.trim_end().ends_with("```"));
    }
}
