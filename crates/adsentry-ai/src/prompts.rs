//! Prompt templates for the identification and advisory stages.

use adsentry_core::TagRegistry;

/// System prompt for tag identification.
pub const IDENTIFY_SYSTEM: &str = "\
你是台灣廣告法規（食品安全衛生管理法、化粧品衛生安全管理法、藥事法、醫療器材管理法）的審查員。\
你只輸出原始 JSON，不加 Markdown 區塊或任何說明文字。";

/// System prompt for the advisory stage.
pub const ADVISE_SYSTEM: &str = "\
你是熟悉台灣廣告裁罰實務的法規顧問。你只能引用提供給你的裁罰案例作為佐證，\
不得捏造案例。你只輸出原始 JSON，不加 Markdown 區塊或任何說明文字。";

/// User prompt asking for the industry and the violation tags in `text`.
///
/// The tag listing comes from `registry` so the model only ever sees the
/// closed vocabulary it is allowed to answer with.
pub fn identify_prompt(registry: &TagRegistry, text: &str) -> String {
    format!(
        r#"請分析以下廣告文案。

任務：
1. 判斷產業類別 industry，只能是 Food、Cosmetic、Medicine、Device 之一；無法判斷時填 Unknown。
2. 判斷文案是否明示或暗示下列違規主題（tag）。即使沒有出現完全相同的字，只要語意屬於該分類的概念也要列出。

違規主題（依分類）：
{listing}
規則：
- "tag" 只能從上面的列表中原字選用，絕對不可以創造新的標籤名稱。
- 提到特定疾病時，若合理屬於既有標籤（例如血壓、血脂、血糖屬於「三高心血管」）才使用；無法歸類就不要為該段產生標籤。
- 每個標籤列出觸發它的原文字詞 trigger_words，必須是文案中逐字出現的字串。
- 沒有任何違規時 identified_tags 為空陣列 []。

文案：
{text}

輸出格式：
{{
  "industry": "Food",
  "identified_tags": [
    {{ "tag": "燃脂瘦身", "trigger_words": ["甩油", "暴瘦"] }}
  ]
}}"#,
        listing = registry.prompt_listing(),
    )
}

/// User prompt asking for per-phrase analysis grounded in `evidence_json`.
///
/// `identification_json` and `evidence_json` are the serialised outputs of the
/// identification and retrieval stages.
pub fn advise_prompt(text: &str, identification_json: &str, evidence_json: &str) -> String {
    format!(
        r#"已初步偵測到下列文案有違規風險，並從資料庫檢索了相似的裁罰案例。

請針對每一個違規字詞（trigger_word）說明違規原因、引用的法條、具體修改建議，並從「檢索到的案例」中挑選 1 到 2 則最相關的案例作為佐證。
reference_cases 只能使用檢索結果中出現的 product_name 與 date；該標籤沒有案例時給空陣列。
最後提供一段修改後、可直接替換原文且符合法規的完整文案 rewrite。

原始文案：
{text}

偵測結果：
{identification_json}

檢索到的案例（依標籤分組）：
{evidence_json}

輸出格式：
{{
  "analysis_results": [
    {{
      "trigger_word": "甩油",
      "tag": "燃脂瘦身",
      "reason": "宣稱可減少體脂肪，易使消費者誤認具減肥功效。",
      "law": "食品安全衛生管理法第28條",
      "suggestion": "改為「促進新陳代謝」。",
      "reference_cases": [ {{ "product_name": "XX綠茶", "date": "2023-10" }} ]
    }}
  ],
  "rewrite": "修改後的完整文案"
}}"#
    )
}
