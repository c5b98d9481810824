//! 貨櫃場：所有可用貨櫃的單一寫入者視圖與快照/還原

use crate::{Container, Pallet};

/// 貨櫃場
///
/// 從主要裝櫃階段開始，所有貨櫃狀態都經由同一個 `&mut ContainerYard` 修改。
/// 模擬在副本上進行；交易式計畫失敗時還原快照。
#[derive(Debug, Clone, Default)]
pub struct ContainerYard {
    containers: Vec<Container>,
}

/// 剩餘容量（或需求量）：數量、重量、邏輯行數
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpareCapacity {
    pub quantity: f64,
    pub weight: f64,
    pub lines: u32,
}

impl SpareCapacity {
    /// 一組棧板的總需求
    pub fn demand_of(pallets: &[Pallet], epsilon: f64) -> Self {
        pallets.iter().fold(Self::default(), |acc, p| Self {
            quantity: acc.quantity + p.quantity,
            weight: acc.weight + p.total_weight,
            lines: acc.lines + p.logical_line_count(epsilon),
        })
    }

    /// 三個維度是否都足以容納 `demand`
    pub fn covers(&self, demand: &SpareCapacity, epsilon: f64) -> bool {
        self.quantity >= demand.quantity - epsilon
            && self.weight >= demand.weight - epsilon
            && self.lines >= demand.lines
    }
}

/// 貨櫃場快照（值語義副本）
#[derive(Debug, Clone)]
pub struct YardSnapshot {
    containers: Vec<Container>,
}

impl ContainerYard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_containers(containers: Vec<Container>) -> Self {
        Self { containers }
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Container> {
        self.containers.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Container> {
        self.containers.get_mut(index)
    }

    /// 加入貨櫃，回傳其位置
    pub fn push(&mut self, container: Container) -> usize {
        self.containers.push(container);
        self.containers.len() - 1
    }

    /// 是否有指定主群組的貨櫃
    pub fn has_group(&self, group: &str) -> bool {
        self.containers.iter().any(|c| c.main_group == group)
    }

    /// 依剩餘數量由少到多排序的貨櫃位置（最佳適配順序）
    pub fn best_fit_order(&self, filter: impl Fn(&Container) -> bool) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .containers
            .iter()
            .enumerate()
            .filter(|(_, c)| filter(c))
            .map(|(i, _)| i)
            .collect();
        indices.sort_by(|a, b| {
            self.containers[*a]
                .remaining_quantity()
                .total_cmp(&self.containers[*b].remaining_quantity())
        });
        indices
    }

    /// 以最佳適配把棧板整體放入符合條件的第一個貨櫃
    ///
    /// 放不下時原樣退回棧板。
    pub fn place_best_fit(
        &mut self,
        pallet: Pallet,
        filter: impl Fn(&Container) -> bool,
    ) -> Result<usize, Pallet> {
        let order = self.best_fit_order(filter);
        for index in order {
            if self.containers[index].can_fit(&pallet) {
                self.containers[index].add(pallet);
                return Ok(index);
            }
        }
        Err(pallet)
    }

    /// 符合條件貨櫃的剩餘數量、重量、邏輯行數加總
    pub fn spare_capacity(&self, filter: impl Fn(&Container) -> bool) -> SpareCapacity {
        self.containers
            .iter()
            .filter(|c| filter(c))
            .fold(SpareCapacity::default(), |acc, c| SpareCapacity {
                quantity: acc.quantity + c.remaining_quantity(),
                weight: acc.weight + c.remaining_weight(),
                lines: acc.lines + c.remaining_logical_lines(),
            })
    }

    /// 建立快照
    pub fn snapshot(&self) -> YardSnapshot {
        YardSnapshot {
            containers: self.containers.clone(),
        }
    }

    /// 還原快照
    pub fn restore(&mut self, snapshot: YardSnapshot) {
        self.containers = snapshot.containers;
    }

    /// 交易式執行：`f` 失敗時還原到執行前的快照
    pub fn transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut ContainerYard) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let snapshot = self.snapshot();
        match f(self) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.restore(snapshot);
                Err(err)
            }
        }
    }

    /// 移除空貨櫃，回傳被移除的ID
    pub fn remove_empty(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        self.containers.retain(|c| {
            if c.is_empty() {
                removed.push(c.id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// 全部棧板數量加總
    pub fn total_quantity(&self) -> f64 {
        self.containers.iter().map(Container::total_quantity).sum()
    }
}
