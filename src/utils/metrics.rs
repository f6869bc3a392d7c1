use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct RankingMetrics {
    k: usize,
}

impl RankingMetrics {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn precision_at_k(&self, recommended: &[String], relevant: &[String]) -> f64 {
        if self.k == 0 || recommended.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<&String> = relevant.iter().collect();
        let hits = recommended
            .iter()
            .take(self.k)
            .filter(|item| relevant_set.contains(item))
            .count();

        hits as f64 / self.k.min(recommended.len()) as f64
    }

    pub fn recall_at_k(&self, recommended: &[String], relevant: &[String]) -> f64 {
        if relevant.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<&String> = relevant.iter().collect();
        let hits = recommended
            .iter()
            .take(self.k)
            .filter(|item| relevant_set.contains(item))
            .count();

        hits as f64 / relevant.len() as f64
    }

    /// Binary-relevance NDCG: a hit at position i contributes 1/log2(i + 2),
    /// the ideal ordering packs all relevant items first.
    pub fn ndcg_at_k(&self, recommended: &[String], relevant: &[String]) -> f64 {
        if relevant.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<&String> = relevant.iter().collect();

        let dcg: f64 = recommended
            .iter()
            .take(self.k)
            .enumerate()
            .filter(|(_, item)| relevant_set.contains(item))
            .map(|(i, _)| 1.0 / ((i + 2) as f64).log2())
            .sum();

        let idcg: f64 = (0..relevant.len().min(self.k))
            .map(|i| 1.0 / ((i + 2) as f64).log2())
            .sum();

        if idcg == 0.0 {
            0.0
        } else {
            dcg / idcg
        }
    }

    pub fn map_at_k(&self, recommended: &[String], relevant: &[String]) -> f64 {
        if relevant.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<&String> = relevant.iter().collect();
        let mut hits = 0;
        let mut precision_sum = 0.0;

        for (i, item) in recommended.iter().take(self.k).enumerate() {
            if relevant_set.contains(item) {
                hits += 1;
                precision_sum += hits as f64 / (i + 1) as f64;
            }
        }

        precision_sum / relevant.len() as f64
    }

    pub fn coverage(&self, all_recommendations: &HashMap<String, Vec<String>>, catalog_size: usize) -> f64 {
        if catalog_size == 0 {
            return 0.0;
        }

        let recommended: HashSet<&String> = all_recommendations.values().flatten().collect();
        recommended.len() as f64 / catalog_size as f64
    }
}
