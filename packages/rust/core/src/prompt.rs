//! Copywriting prompt for a single product.

use enricher_shared::Product;

/// Build the generation prompt for `product` in category `category`.
///
/// The copy is written for the Portuguese B2B market, so the instructions
/// are in European Portuguese. The JSON keys match [`enricher_shared::GeneratedCopy`].
pub fn build_prompt(product: &Product, category: &str) -> String {
    let name = product.name.as_deref().unwrap_or_default();
    let description = product.description.as_deref().unwrap_or_default();
    let notes = product.notes_text().unwrap_or_default();

    format!(
        r#"És um copywriter especializado em produtos de acrílico e expositores para o mercado português B2B.

PRODUTO: {name}
CATEGORIA: {category}
DESCRIÇÃO ATUAL: {description}
NOTAS TÉCNICAS: {notes}

Gera conteúdo comercial em Português de Portugal (PT-PT, não brasileiro).

REGRAS:
- Tom profissional mas acessível
- Foca em benefícios práticos para empresas
- Não uses chavões vazios
- Não inventes especificações técnicas
- "advantages" deve ser texto corrido (prosa), NÃO uses bullets ou listas

RESPONDE APENAS com JSON válido (sem markdown, sem ```):
{{
  "summary": "Frase comercial apelativa, máximo 200 caracteres",
  "full_description": "2-3 parágrafos descrevendo o produto, aplicações e características",
  "advantages": "Texto corrido sobre benefícios: qualidade do material, durabilidade, facilidade de instalação, versatilidade, manutenção simples"
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use enricher_shared::RecordId;
    use serde_json::Map;

    #[test]
    fn prompt_includes_product_context() {
        let product = Product {
            id: RecordId::Int(1),
            name: Some("Expositor de mesa A4".into()),
            category_id: Some(RecordId::Int(2)),
            description: Some("Expositor vertical".into()),
            notes: Some("Largura: 210mm".into()),
            extra: Map::new(),
        };
        let prompt = build_prompt(&product, "Expositores");

        assert!(prompt.contains("PRODUTO: Expositor de mesa A4"));
        assert!(prompt.contains("CATEGORIA: Expositores"));
        assert!(prompt.contains("DESCRIÇÃO ATUAL: Expositor vertical"));
        assert!(prompt.contains("NOTAS TÉCNICAS: Largura: 210mm"));
        assert!(prompt.contains(r#""full_description":"#));
    }

    #[test]
    fn missing_fields_render_empty() {
        let product = Product {
            id: RecordId::Text("x".into()),
            name: None,
            category_id: None,
            description: None,
            notes: None,
            extra: Map::new(),
        };
        let prompt = build_prompt(&product, "Acrílicos");
        assert!(prompt.contains("PRODUTO: \n"));
        assert!(prompt.contains("NOTAS TÉCNICAS: \n"));
    }
}
