use crate::models::*;
use anyhow::{Result, anyhow};

pub const MAX_TOP_K: usize = 100;

pub fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(anyhow!("top_k must be greater than 0"));
    }

    if top_k > MAX_TOP_K {
        return Err(anyhow!("top_k too large: {} (max {})", top_k, MAX_TOP_K));
    }

    Ok(())
}

pub fn validate_recommend_request(request: &RecommendRequest) -> Result<()> {
    if request.user_id.is_empty() {
        return Err(anyhow!("user_id cannot be empty"));
    }

    validate_top_k(request.top_k)?;
    validate_filters(&request.filters)?;

    Ok(())
}

pub fn validate_query_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(anyhow!("query embedding cannot be empty"));
    }

    for &value in embedding {
        if !value.is_finite() {
            return Err(anyhow!("query embedding contains invalid values (NaN or Infinity)"));
        }
    }

    if embedding.len() > 4096 {
        return Err(anyhow!("query embedding dimension too large (max 4096)"));
    }

    Ok(())
}

pub fn validate_filters(filters: &AttributeFilters) -> Result<()> {
    if let Some(ref category) = filters.category {
        if category.is_empty() {
            return Err(anyhow!("category filter cannot be empty"));
        }
        if category.len() > 100 {
            return Err(anyhow!("category filter too long (max 100 characters)"));
        }
    }

    if let Some(min_rating) = filters.min_rating {
        if !(0.0..=5.0).contains(&min_rating) {
            return Err(anyhow!("min_rating must be between 0.0 and 5.0"));
        }
    }

    Ok(())
}

pub fn validate_interaction(interaction: &Interaction) -> Result<()> {
    if interaction.user_id.is_empty() {
        return Err(anyhow!("interaction user_id cannot be empty"));
    }

    if interaction.product_id.is_empty() {
        return Err(anyhow!("interaction product_id cannot be empty"));
    }

    if !interaction.rating.is_finite() || !(0.0..=5.0).contains(&interaction.rating) {
        return Err(anyhow!("interaction rating must be between 0.0 and 5.0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_recommend_request() {
        let valid = RecommendRequest {
            user_id: "U1".to_string(),
            top_k: 10,
            exclude_seen: true,
            diversify: false,
            filters: AttributeFilters::default(),
        };
        assert!(validate_recommend_request(&valid).is_ok());

        let empty_user = RecommendRequest {
            user_id: String::new(),
            ..valid.clone()
        };
        assert!(validate_recommend_request(&empty_user).is_err());

        let oversized = RecommendRequest {
            top_k: MAX_TOP_K + 1,
            ..valid
        };
        assert!(validate_recommend_request(&oversized).is_err());
    }

    #[test]
    fn test_validate_query_embedding() {
        assert!(validate_query_embedding(&[0.1, 0.2, 0.3]).is_ok());
        assert!(validate_query_embedding(&[]).is_err());
        assert!(validate_query_embedding(&[f32::NAN, 0.2]).is_err());
    }

    #[test]
    fn test_validate_filters() {
        let valid = AttributeFilters {
            category: Some("electronics".to_string()),
            min_rating: Some(4.0),
            min_interactions: Some(5),
        };
        assert!(validate_filters(&valid).is_ok());

        let bad_rating = AttributeFilters {
            min_rating: Some(7.5),
            ..AttributeFilters::default()
        };
        assert!(validate_filters(&bad_rating).is_err());
    }
}
