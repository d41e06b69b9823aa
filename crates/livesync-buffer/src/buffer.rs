//! BoundedBuffer 実装

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::capacity::Capacity;

/// 挿入ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    /// 常に先頭へ追加（重複も履歴として残す）
    Prepend,
    /// キー一致なら同じ位置で置換、なければ先頭へ追加
    Upsert,
}

/// キーを持たない要素用のキー関数
///
/// [`InsertPolicy::Prepend`] で [`BoundedBuffer::insert`] を呼ぶときに渡す。
pub fn no_key<T>(_: &T) -> Option<()> {
    None
}

/// 容量固定・挿入順の不変バッファ
///
/// 先頭が最新、末尾が最古。
/// 挿入系メソッドはすべて `&self` を取り、新しいバッファを返す。
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    items: Arc<[T]>,
}

impl<T> BoundedBuffer<T> {
    /// 空のバッファを生成する
    pub fn new() -> Self {
        BoundedBuffer {
            items: Arc::from(Vec::new()),
        }
    }

    /// 要素列からバッファを生成する（先頭から `capacity` 件のみ保持）
    ///
    /// スナップショットによる全置換やハイドレーション結果の取り込みに使う。
    pub fn from_items<I>(items: I, capacity: Capacity) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().take(capacity.get()).collect();
        BoundedBuffer {
            items: Arc::from(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// 2 つのバッファが同じ実体を共有しているか
    ///
    /// 挿入は常に新しい実体を作るため、`true` なら内容も変わっていない。
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    /// キーが一致する最初の要素の位置
    pub fn position_by<K, F>(&self, key: &K, key_fn: F) -> Option<usize>
    where
        K: PartialEq,
        F: Fn(&T) -> Option<K>,
    {
        self.items
            .iter()
            .position(|existing| key_fn(existing).as_ref() == Some(key))
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// ポリシーに従って要素を挿入した新しいバッファを返す
    ///
    /// # 引数
    /// - `item`: 挿入する要素
    /// - `policy`: 挿入ポリシー
    /// - `capacity`: 容量。結果の長さは常に `capacity` 以下
    /// - `key_fn`: 要素からキーを取り出す関数。`Prepend` では使われない
    ///   （[`no_key`] を渡せばよい）
    pub fn insert<K, F>(&self, item: T, policy: InsertPolicy, capacity: Capacity, key_fn: F) -> Self
    where
        K: PartialEq,
        F: Fn(&T) -> Option<K>,
    {
        match policy {
            InsertPolicy::Prepend => self.prepend(item, capacity),
            InsertPolicy::Upsert => self.upsert_by(item, capacity, key_fn),
        }
    }

    /// 先頭へ追加し、容量超過分を末尾（最古）から捨てる
    pub fn prepend(&self, item: T, capacity: Capacity) -> Self {
        let cap = capacity.get();
        if cap == 0 {
            return BoundedBuffer::new();
        }

        let mut items = Vec::with_capacity(cap.min(self.items.len() + 1));
        items.push(item);
        items.extend(self.items.iter().take(cap - 1).cloned());

        BoundedBuffer {
            items: Arc::from(items),
        }
    }

    /// キーが一致する要素を同じ位置で置き換える
    ///
    /// - 一致する要素があれば置換（長さ・並びは変わらない）
    /// - 一致がなければ先頭へ追加
    /// - 挿入する要素のキーが取れない場合も先頭へ追加（捨てない）
    pub fn upsert_by<K, F>(&self, item: T, capacity: Capacity, key_fn: F) -> Self
    where
        K: PartialEq,
        F: Fn(&T) -> Option<K>,
    {
        let position = key_fn(&item).and_then(|key| self.position_by(&key, &key_fn));

        match position {
            Some(index) => {
                let mut items: Vec<T> = self.items.to_vec();
                items[index] = item;
                // 容量が後から縮められた場合にも上限を守る
                items.truncate(capacity.get());
                BoundedBuffer {
                    items: Arc::from(items),
                }
            }
            None => self.prepend(item, capacity),
        }
    }
}

impl<T> Clone for BoundedBuffer<T> {
    fn clone(&self) -> Self {
        BoundedBuffer {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for BoundedBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for BoundedBuffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items[..] == other.items[..]
    }
}

impl<'a, T> IntoIterator for &'a BoundedBuffer<T> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
