// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/frame.rs - 帧尺寸定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{DynamicImage, RgbImage};

/// 流水线只需要知道输入帧的像素尺寸，像素内容由各层模型自行解释。
pub trait FrameSize {
  fn width(&self) -> u32;
  fn height(&self) -> u32;

  /// (宽, 高)
  fn size(&self) -> (u32, u32) {
    (self.width(), self.height())
  }
}

impl FrameSize for RgbImage {
  fn width(&self) -> u32 {
    self.width()
  }

  fn height(&self) -> u32 {
    self.height()
  }
}

impl FrameSize for DynamicImage {
  fn width(&self) -> u32 {
    self.width()
  }

  fn height(&self) -> u32 {
    self.height()
  }
}

impl<T: FrameSize + ?Sized> FrameSize for &T {
  fn width(&self) -> u32 {
    (**self).width()
  }

  fn height(&self) -> u32 {
    (**self).height()
  }
}
