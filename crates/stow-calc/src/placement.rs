//! 逐櫃拆分放置
//!
//! 依最佳適配順序把棧板分段放入多個貨櫃。模擬與實際執行共用同一段計算，
//! 模擬時只是作用在貨櫃場的副本上。

use stow_core::{Container, ContainerYard, Pallet};

/// 單一貨櫃還能放入的數量
///
/// 取剩餘需求、剩餘數量、剩餘重量可容納的單位數與剩餘邏輯行數的最小值；
/// 整數棧板向下取整。
pub fn placeable_amount(
    container: &Container,
    pallet: &Pallet,
    remaining: f64,
    integral: bool,
) -> f64 {
    let eps = container.capacity().epsilon;
    let by_weight = if pallet.weight_per_unit > eps {
        container.remaining_weight() / pallet.weight_per_unit
    } else {
        f64::INFINITY
    };

    let amount = remaining
        .min(container.remaining_quantity())
        .min(by_weight)
        .min(f64::from(container.remaining_logical_lines()));

    if integral {
        (amount + eps).floor()
    } else {
        amount
    }
}

/// 把棧板逐櫃放入符合條件的貨櫃
///
/// 回傳放不下的剩餘部分；全部放完時回傳 `None`。
pub fn place_iteratively(
    yard: &mut ContainerYard,
    pallet: Pallet,
    filter: impl Fn(&Container) -> bool,
) -> Option<Pallet> {
    let order = yard.best_fit_order(filter);
    let mut current = pallet;

    for index in order {
        let Some(container) = yard.get_mut(index) else {
            continue;
        };
        let eps = container.capacity().epsilon;
        let integral = (current.quantity - current.quantity.round()).abs() < eps;
        let amount = placeable_amount(container, &current, current.quantity, integral);

        if (integral && amount < 1.0) || amount <= eps {
            continue;
        }

        if amount >= current.quantity - eps {
            if container.can_fit(&current) {
                tracing::debug!("棧板 {} 整體放入貨櫃 {}", current.id, container.id);
                container.add(current);
                return None;
            }
            continue;
        }

        let Some((part, rem)) = current.split(amount, eps) else {
            continue;
        };
        if !container.can_fit(&part) {
            continue;
        }
        tracing::debug!("棧板 {} 拆出 {} 放入貨櫃 {}", current.id, amount, container.id);
        container.add(part);
        current = rem;
    }

    Some(current)
}

/// 模擬逐櫃放置是否能全部放完（不影響原貨櫃場）
pub fn can_place_iteratively(
    yard: &ContainerYard,
    pallet: &Pallet,
    filter: impl Fn(&Container) -> bool,
) -> bool {
    let mut draft = yard.clone();
    place_iteratively(&mut draft, pallet.clone(), filter).is_none()
}
