use super::models::Subscription;

/// UTF-8のバイトオーダーマーク（表計算ソフトでの文字化け防止）
pub const UTF8_BOM: &str = "\u{feff}";

/// エクスポートの列順（固定）
pub const EXPORT_HEADER: [&str; 7] = [
    "Name",
    "Category",
    "Amount",
    "Currency",
    "Renewal Date",
    "Cycle",
    "Status",
];

/// CSVフィールドをエスケープする
///
/// カンマ・引用符・改行を含む場合のみ引用符で囲む。
fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// サブスクリプション一覧をCSVテキストに変換する
///
/// # 戻り値
/// BOM付きUTF-8テキスト（ヘッダー行 + 1件1行、改行区切り）
pub fn export_csv(subscriptions: &[Subscription]) -> String {
    let mut lines = Vec::with_capacity(subscriptions.len() + 1);
    lines.push(EXPORT_HEADER.join(","));

    for sub in subscriptions {
        let fields = [
            escape_field(&sub.name),
            sub.category.to_string(),
            sub.amount.to_string(),
            escape_field(&sub.currency),
            sub.renewal_date.format("%Y-%m-%d").to_string(),
            sub.billing_cycle.to_string(),
            sub.status.to_string(),
        ];
        lines.push(fields.join(","));
    }

    format!("{UTF8_BOM}{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::models::{BillingCycle, SubscriptionDraft};
    use chrono::NaiveDate;

    fn sub(id: &str, name: &str) -> Subscription {
        Subscription::from_draft(
            id.to_string(),
            SubscriptionDraft::new(
                name,
                54.9,
                "₪",
                NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            ),
        )
    }

    #[test]
    fn test_export_two_records() {
        let mut spotify = sub("2", "Spotify");
        spotify.billing_cycle = BillingCycle::Yearly;
        let csv = export_csv(&[sub("1", "Netflix"), spotify]);

        assert!(csv.starts_with(UTF8_BOM));
        let lines: Vec<&str> = csv.trim_start_matches(UTF8_BOM).lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Name,Category,Amount,Currency,Renewal Date,Cycle,Status"
        );
        assert_eq!(lines[1], "Netflix,other,54.9,₪,2025-03-10,monthly,active");
        assert_eq!(lines[2], "Spotify,other,54.9,₪,2025-03-10,yearly,active");
    }

    #[test]
    fn test_export_escapes_commas_and_quotes() {
        let csv = export_csv(&[sub("1", "Disney+, \"Bundle\"")]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("\"Disney+, \"\"Bundle\"\"\","));
    }

    #[test]
    fn test_export_empty_list_has_header_only() {
        let csv = export_csv(&[]);
        assert_eq!(csv.trim_start_matches(UTF8_BOM).lines().count(), 1);
    }
}
